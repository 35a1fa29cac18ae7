//! Training loop and restored inference sessions.
//!
//! [`Trainer`] owns the parameter bundle and drives the contrastive
//! objective over fixed minibatch windows, resuming from an existing
//! checkpoint when one is present and saving a fresh one when the run
//! completes. [`InferenceSession`] is the read-only counterpart: it refuses
//! to start without a checkpoint and serves ranked matches.

use candle_core::backprop::GradStore;
use candle_core::{DType, Device, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use tracing::{debug, info, warn};

use crate::batch::SequenceBatch;
use crate::checkpoint::{CheckpointManifest, CheckpointStore, unix_timestamp};
use crate::config::MatchConfig;
use crate::constants::{GRAD_CLIP_NORM, NEGATIVE_SAMPLE_DIVISOR, negative_sample_count};
use crate::encoder::SequenceEncoder;
use crate::error::MatchError;
use crate::matcher::{
    InferenceMatcher, Matcher, TrainingMatcher, accuracy, contrastive_loss, rank_top_k,
};
use crate::vocab::VectorTable;

/// Per-epoch aggregates over every step in the pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub mean_loss: f32,
    pub mean_accuracy: f32,
}

/// Outcome of one [`Trainer::run`] call.
#[derive(Debug, Clone)]
pub struct TrainReport {
    /// True when the run continued from an existing checkpoint.
    pub resumed: bool,
    pub epochs: Vec<EpochStats>,
}

/// Owns the encoder's parameter bundle and trains it in place.
pub struct Trainer {
    config: MatchConfig,
    bundle: VarMap,
    encoder: SequenceEncoder,
    store: CheckpointStore,
    vector_dim: usize,
}

impl Trainer {
    /// Builds a freshly initialised encoder for `table` on `device`. No
    /// checkpoint is touched until [`run`](Trainer::run).
    pub fn new(
        config: MatchConfig,
        table: &VectorTable,
        device: Device,
    ) -> Result<Self, MatchError> {
        config.validate()?;

        let bundle = VarMap::new();
        let vb = VarBuilder::from_varmap(&bundle, DType::F32, &device);
        let encoder = SequenceEncoder::new(table, config.hidden_width, vb, &device)?;
        let store = CheckpointStore::new(&config.checkpoint_dir, &config.model_name);

        Ok(Self {
            config,
            bundle,
            encoder,
            store,
            vector_dim: table.dim(),
        })
    }

    /// Trains the encoder on aligned query/candidate pairs and saves a
    /// checkpoint at the end.
    ///
    /// An existing checkpoint is restored first so repeated runs continue
    /// from where the previous one stopped. Each epoch walks the same
    /// minibatch windows in order; a trailing window shorter than the batch
    /// size is dropped.
    pub fn run(
        &mut self,
        queries: &SequenceBatch,
        candidates: &SequenceBatch,
    ) -> Result<TrainReport, MatchError> {
        if queries.len() != candidates.len() {
            return Err(MatchError::ShapeMismatch {
                reason: format!(
                    "{} queries but {} candidates; training pairs must align",
                    queries.len(),
                    candidates.len()
                ),
            });
        }

        let dataset_size = queries.len();
        let batch_size = self.config.effective_batch_size(dataset_size);
        if batch_size > dataset_size {
            return Err(MatchError::InvalidConfig {
                reason: format!(
                    "batch_size {batch_size} exceeds the dataset ({dataset_size} rows)"
                ),
            });
        }

        let steps = dataset_size / batch_size;
        let negatives = negative_sample_count(dataset_size);
        if negatives == 0 {
            warn!(
                dataset_size,
                divisor = NEGATIVE_SAMPLE_DIVISOR,
                "Dataset too small for negative sampling; every step trains a single column"
            );
        }

        let (resumed, prior_epochs) = if self.store.is_present() {
            let manifest = self.store.restore(&mut self.bundle)?;
            (true, manifest.epochs_completed)
        } else {
            info!("No checkpoint found; starting from fresh parameters");
            (false, 0)
        };

        let vars = self.bundle.all_vars();
        let mut optimizer = AdamW::new(
            vars.clone(),
            ParamsAdamW {
                lr: self.config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;
        let mut matcher = TrainingMatcher::new(negatives, self.config.gamma, self.config.seed);

        info!(
            dataset_size,
            batch_size,
            steps_per_epoch = steps,
            negatives,
            epochs = self.config.epoch_count,
            resumed,
            "Starting training run"
        );

        let mut epochs = Vec::with_capacity(self.config.epoch_count);
        for epoch in 0..self.config.epoch_count {
            let mut loss_sum = 0.0f32;
            let mut accuracy_sum = 0.0f32;

            for step in 0..steps {
                let start = step * batch_size;
                let query_window = queries.slice(start, batch_size)?;
                let candidate_window = candidates.slice(start, batch_size)?;

                let query_states = self.encoder.encode(&query_window, true)?;
                let candidate_states = self.encoder.encode(&candidate_window, true)?;

                let similarities = matcher.similarities(&query_states, &candidate_states)?;
                let loss = contrastive_loss(&similarities)?;
                let step_accuracy = accuracy(&similarities)?;

                let mut grads = loss.backward()?;
                let grad_norm = clip_global_norm(&mut grads, &vars, GRAD_CLIP_NORM)?;
                optimizer.step(&grads)?;

                let step_loss = loss.to_scalar::<f32>()?;
                loss_sum += step_loss;
                accuracy_sum += step_accuracy;
                debug!(
                    epoch,
                    step,
                    loss = step_loss,
                    accuracy = step_accuracy,
                    grad_norm,
                    "Completed training step"
                );
            }

            let stats = EpochStats {
                epoch,
                mean_loss: loss_sum / steps as f32,
                mean_accuracy: accuracy_sum / steps as f32,
            };
            info!(
                epoch,
                loss = stats.mean_loss,
                accuracy = stats.mean_accuracy,
                "Completed epoch"
            );
            epochs.push(stats);
        }

        let manifest = CheckpointManifest {
            model: self.config.model_name.clone(),
            hidden_width: self.config.hidden_width,
            vector_dim: self.vector_dim,
            epochs_completed: prior_epochs + self.config.epoch_count,
            unix_timestamp: unix_timestamp(),
        };
        self.store.save(&self.bundle, &manifest)?;

        Ok(TrainReport { resumed, epochs })
    }
}

/// Scales every gradient in place when the global L2 norm exceeds
/// `max_norm`. Returns the norm measured before clipping.
fn clip_global_norm(
    grads: &mut GradStore,
    vars: &[Var],
    max_norm: f64,
) -> Result<f64, MatchError> {
    let mut total = 0.0f64;
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            total += grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }

    let norm = total.sqrt();
    if norm > max_norm {
        let scale = max_norm / norm;
        for var in vars {
            if let Some(grad) = grads.get(var.as_tensor()) {
                let scaled = grad.affine(scale, 0.0)?;
                grads.insert(var.as_tensor(), scaled);
            }
        }
    }
    Ok(norm)
}

/// Read-only session over a restored checkpoint.
pub struct InferenceSession {
    config: MatchConfig,
    encoder: SequenceEncoder,
    manifest: CheckpointManifest,
}

impl InferenceSession {
    /// Builds the encoder and fills it from the stored checkpoint. Fails
    /// with [`MatchError::MissingCheckpoint`] when none was saved.
    pub fn restore(
        config: MatchConfig,
        table: &VectorTable,
        device: Device,
    ) -> Result<Self, MatchError> {
        config.validate()?;

        let mut bundle = VarMap::new();
        let vb = VarBuilder::from_varmap(&bundle, DType::F32, &device);
        let encoder = SequenceEncoder::new(table, config.hidden_width, vb, &device)?;
        let store = CheckpointStore::new(&config.checkpoint_dir, &config.model_name);
        let manifest = store.restore(&mut bundle)?;

        info!(model = %manifest.model, epochs = manifest.epochs_completed, "Inference session ready");
        Ok(Self {
            config,
            encoder,
            manifest,
        })
    }

    pub fn manifest(&self) -> &CheckpointManifest {
        &self.manifest
    }

    /// Ranks every candidate for every query and returns each query's top-k
    /// candidate indices, best first.
    pub fn rank(
        &self,
        queries: &SequenceBatch,
        candidates: &SequenceBatch,
    ) -> Result<Vec<Vec<usize>>, MatchError> {
        let query_states = self.encoder.encode(queries, false)?;
        let candidate_states = self.encoder.encode(candidates, false)?;

        let mut matcher = InferenceMatcher::new(self.config.gamma);
        let similarities = matcher.similarities(&query_states, &candidate_states)?;
        rank_top_k(&similarities, self.config.top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{VectorTable, Vocabulary};
    use candle_core::Tensor;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::path::Path;

    const TOKENS: [&str; 12] = [
        "sun", "rises", "east", "moon", "orbits", "earth", "rain", "falls", "down", "wind",
        "blows", "north",
    ];

    fn vocab_and_table() -> (Vocabulary, VectorTable) {
        let vocab = Vocabulary::from_tokens(TOKENS);
        let vectors = (0..12)
            .map(|i| (0..4).map(|j| ((i * 4 + j) as f32).sin()).collect())
            .collect();
        let mut rng = StdRng::seed_from_u64(3);
        let table = VectorTable::build(&vocab, vectors, &mut rng).expect("Should build table");
        (vocab, table)
    }

    fn dataset(vocab: &Vocabulary, table: &VectorTable) -> (SequenceBatch, SequenceBatch) {
        let queries: Vec<Vec<&str>> = (0..12)
            .map(|i| vec![TOKENS[i], TOKENS[(i + 1) % 12]])
            .collect();
        let candidates: Vec<Vec<&str>> = (0..12)
            .map(|i| vec![TOKENS[(i + 2) % 12], TOKENS[(i + 3) % 12], TOKENS[i]])
            .collect();

        let queries = SequenceBatch::build(&queries, vocab, table).expect("Should build queries");
        let candidates =
            SequenceBatch::build(&candidates, vocab, table).expect("Should build candidates");
        (queries, candidates)
    }

    fn test_config(dir: &Path) -> MatchConfig {
        MatchConfig {
            hidden_width: 8,
            learning_rate: 0.05,
            epoch_count: 2,
            gamma: 20.0,
            batch_size: 4,
            top_k: 1,
            seed: 17,
            checkpoint_dir: dir.to_path_buf(),
            model_name: "unit".to_string(),
        }
    }

    mod run_tests {
        use super::*;

        #[test]
        fn test_fresh_run_reports_every_epoch_and_saves() {
            let dir = tempfile::tempdir().expect("Should create temp dir");
            let (vocab, table) = vocab_and_table();
            let (queries, candidates) = dataset(&vocab, &table);

            let mut trainer = Trainer::new(test_config(dir.path()), &table, Device::Cpu)
                .expect("Should build trainer");
            let report = trainer.run(&queries, &candidates).expect("Should train");

            assert!(!report.resumed, "no checkpoint existed yet");
            assert_eq!(report.epochs.len(), 2);
            for stats in &report.epochs {
                assert!(stats.mean_loss.is_finite());
                assert!(stats.mean_loss >= 0.0, "negative log-likelihood");
                assert!((0.0..=1.0).contains(&stats.mean_accuracy));
            }

            let store = CheckpointStore::new(dir.path(), "unit");
            assert!(store.is_present(), "run must leave a checkpoint behind");
        }

        #[test]
        fn test_second_run_resumes_and_accumulates_epochs() {
            let dir = tempfile::tempdir().expect("Should create temp dir");
            let (vocab, table) = vocab_and_table();
            let (queries, candidates) = dataset(&vocab, &table);

            let mut first = Trainer::new(test_config(dir.path()), &table, Device::Cpu)
                .expect("Should build trainer");
            let report = first.run(&queries, &candidates).expect("Should train");
            assert!(!report.resumed);

            let mut second = Trainer::new(test_config(dir.path()), &table, Device::Cpu)
                .expect("Should build trainer");
            let report = second.run(&queries, &candidates).expect("Should train");
            assert!(report.resumed, "second run continues from the checkpoint");

            let store = CheckpointStore::new(dir.path(), "unit");
            let manifest: CheckpointManifest = serde_json::from_str(
                &std::fs::read_to_string(store.manifest_path()).expect("Should read manifest"),
            )
            .expect("Should parse manifest");
            assert_eq!(manifest.epochs_completed, 4, "two runs of two epochs each");
        }

        #[test]
        fn test_mismatched_pair_counts_are_rejected() {
            let dir = tempfile::tempdir().expect("Should create temp dir");
            let (vocab, table) = vocab_and_table();
            let (queries, candidates) = dataset(&vocab, &table);
            let truncated = candidates.slice(0, 8).expect("Should slice");

            let mut trainer = Trainer::new(test_config(dir.path()), &table, Device::Cpu)
                .expect("Should build trainer");
            let result = trainer.run(&queries, &truncated);
            assert!(matches!(result, Err(MatchError::ShapeMismatch { .. })));
        }

        #[test]
        fn test_batch_size_beyond_dataset_is_rejected() {
            let dir = tempfile::tempdir().expect("Should create temp dir");
            let (vocab, table) = vocab_and_table();
            let (queries, candidates) = dataset(&vocab, &table);

            let config = MatchConfig {
                batch_size: 64,
                ..test_config(dir.path())
            };
            let mut trainer =
                Trainer::new(config, &table, Device::Cpu).expect("Should build trainer");
            let result = trainer.run(&queries, &candidates);
            assert!(matches!(result, Err(MatchError::InvalidConfig { .. })));
        }
    }

    mod clip_tests {
        use super::*;

        fn gradient_norm(grads: &GradStore, var: &Var) -> f64 {
            let grad = grads.get(var.as_tensor()).expect("Should hold a gradient");
            (grad
                .sqr()
                .expect("Should square")
                .sum_all()
                .expect("Should sum")
                .to_scalar::<f32>()
                .expect("Should copy to host") as f64)
                .sqrt()
        }

        #[test]
        fn test_large_gradients_are_scaled_to_the_ceiling() {
            let var = Var::from_tensor(
                &Tensor::from_vec(vec![1.0f32, 1.0], (2,), &Device::Cpu)
                    .expect("Should build tensor"),
            )
            .expect("Should build var");

            let loss = (var.as_tensor() * 100.0)
                .expect("Should scale")
                .sum_all()
                .expect("Should sum");
            let mut grads = loss.backward().expect("Should backprop");

            let reported = clip_global_norm(&mut grads, &[var.clone()], 5.0)
                .expect("Should clip");
            assert!((reported - (2.0f64).sqrt() * 100.0).abs() < 1e-3);
            assert!(
                (gradient_norm(&grads, &var) - 5.0).abs() < 1e-4,
                "clipped norm must sit at the ceiling"
            );
        }

        #[test]
        fn test_small_gradients_pass_untouched() {
            let var = Var::from_tensor(
                &Tensor::from_vec(vec![1.0f32, 1.0], (2,), &Device::Cpu)
                    .expect("Should build tensor"),
            )
            .expect("Should build var");

            let loss = (var.as_tensor() * 0.01)
                .expect("Should scale")
                .sum_all()
                .expect("Should sum");
            let mut grads = loss.backward().expect("Should backprop");

            let before = gradient_norm(&grads, &var);
            let reported = clip_global_norm(&mut grads, &[var.clone()], 5.0)
                .expect("Should clip");
            assert!((reported - before).abs() < 1e-9);
            assert!((gradient_norm(&grads, &var) - before).abs() < 1e-9);
        }
    }

    mod session_tests {
        use super::*;

        #[test]
        fn test_inference_session_requires_a_checkpoint() {
            let dir = tempfile::tempdir().expect("Should create temp dir");
            let (_, table) = vocab_and_table();

            let result = InferenceSession::restore(test_config(dir.path()), &table, Device::Cpu);
            assert!(matches!(result, Err(MatchError::MissingCheckpoint { .. })));
        }
    }
}
