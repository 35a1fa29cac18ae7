//! End-to-end pipeline tests: build a table, train, checkpoint, restore, rank.

use std::path::Path;

use candle_core::Device;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use simnet::{
    InferenceSession, MatchConfig, MatchError, SequenceBatch, Trainer, VectorTable, Vocabulary,
};

const TOKENS: [&str; 16] = [
    "plants", "grow", "sunlight", "water", "fish", "swim", "ocean", "birds", "fly", "sky",
    "stars", "shine", "night", "rain", "clouds", "wind",
];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn vocab_and_table() -> (Vocabulary, VectorTable) {
    let vocab = Vocabulary::from_tokens(TOKENS);
    let vectors = (0..TOKENS.len())
        .map(|i| (0..6).map(|j| ((i * 6 + j) as f32).sin()).collect())
        .collect();
    let mut rng = StdRng::seed_from_u64(21);
    let table = VectorTable::build(&vocab, vectors, &mut rng).expect("Should build table");
    (vocab, table)
}

/// Twelve aligned pairs; query `i` and candidate `i` share their head token.
fn dataset(vocab: &Vocabulary, table: &VectorTable) -> (SequenceBatch, SequenceBatch) {
    let queries: Vec<Vec<&str>> = (0..12)
        .map(|i| vec![TOKENS[i], TOKENS[(i + 1) % 16]])
        .collect();
    let candidates: Vec<Vec<&str>> = (0..12)
        .map(|i| vec![TOKENS[i], TOKENS[(i + 4) % 16], TOKENS[(i + 5) % 16]])
        .collect();

    let queries = SequenceBatch::build(&queries, vocab, table).expect("Should build queries");
    let candidates =
        SequenceBatch::build(&candidates, vocab, table).expect("Should build candidates");
    (queries, candidates)
}

fn pipeline_config(dir: &Path, top_k: usize) -> MatchConfig {
    MatchConfig {
        hidden_width: 8,
        learning_rate: 0.05,
        epoch_count: 3,
        gamma: 20.0,
        batch_size: 4,
        top_k,
        seed: 29,
        checkpoint_dir: dir.to_path_buf(),
        model_name: "pipeline".to_string(),
    }
}

#[test]
fn test_train_checkpoint_restore_rank() {
    init_tracing();
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let (vocab, table) = vocab_and_table();
    let (queries, candidates) = dataset(&vocab, &table);

    let mut trainer = Trainer::new(pipeline_config(dir.path(), 2), &table, Device::Cpu)
        .expect("Should build trainer");
    let report = trainer.run(&queries, &candidates).expect("Should train");

    assert!(!report.resumed);
    assert_eq!(report.epochs.len(), 3);
    for stats in &report.epochs {
        assert!(stats.mean_loss.is_finite(), "loss must stay finite");
        assert!((0.0..=1.0).contains(&stats.mean_accuracy));
    }

    let session = InferenceSession::restore(pipeline_config(dir.path(), 2), &table, Device::Cpu)
        .expect("Should restore session");
    assert_eq!(session.manifest().epochs_completed, 3);

    let probe = queries.slice(0, 3).expect("Should slice queries");
    let ranked = session.rank(&probe, &candidates).expect("Should rank");

    assert_eq!(ranked.len(), 3, "one ranking per query");
    for row in &ranked {
        assert_eq!(row.len(), 2, "top_k candidates per query");
        for &index in row {
            assert!(index < 12, "index {index} must address a candidate");
        }
        assert_ne!(row[0], row[1], "ranked indices must be distinct");
    }
}

#[test]
fn test_identical_sequences_rank_themselves_first() {
    init_tracing();
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let (vocab, table) = vocab_and_table();
    let (queries, candidates) = dataset(&vocab, &table);

    let mut trainer = Trainer::new(pipeline_config(dir.path(), 1), &table, Device::Cpu)
        .expect("Should build trainer");
    trainer.run(&queries, &candidates).expect("Should train");

    let session = InferenceSession::restore(pipeline_config(dir.path(), 1), &table, Device::Cpu)
        .expect("Should restore session");

    // Querying the query set against itself puts every row's own state at
    // cosine 1, the maximum the smoothing preserves.
    let ranked = session.rank(&queries, &queries).expect("Should rank");
    for (i, row) in ranked.iter().enumerate() {
        assert_eq!(row[0], i, "query {i} must match itself first");
    }
}

#[test]
fn test_second_run_resumes_from_checkpoint() {
    init_tracing();
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let (vocab, table) = vocab_and_table();
    let (queries, candidates) = dataset(&vocab, &table);

    let mut first = Trainer::new(pipeline_config(dir.path(), 1), &table, Device::Cpu)
        .expect("Should build trainer");
    assert!(!first.run(&queries, &candidates).expect("Should train").resumed);

    let mut second = Trainer::new(pipeline_config(dir.path(), 1), &table, Device::Cpu)
        .expect("Should build trainer");
    let report = second.run(&queries, &candidates).expect("Should train");
    assert!(report.resumed, "second run continues from the saved bundle");

    let session = InferenceSession::restore(pipeline_config(dir.path(), 1), &table, Device::Cpu)
        .expect("Should restore session");
    assert_eq!(
        session.manifest().epochs_completed,
        6,
        "two runs of three epochs each"
    );
}

#[test]
fn test_restore_without_training_fails() {
    init_tracing();
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let (_, table) = vocab_and_table();

    let result = InferenceSession::restore(pipeline_config(dir.path(), 1), &table, Device::Cpu);
    assert!(matches!(result, Err(MatchError::MissingCheckpoint { .. })));
}

#[test]
fn test_unknown_tokens_flow_through_the_pipeline() {
    init_tracing();
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let (vocab, table) = vocab_and_table();
    let (queries, candidates) = dataset(&vocab, &table);

    let mut trainer = Trainer::new(pipeline_config(dir.path(), 1), &table, Device::Cpu)
        .expect("Should build trainer");
    trainer.run(&queries, &candidates).expect("Should train");

    let session = InferenceSession::restore(pipeline_config(dir.path(), 1), &table, Device::Cpu)
        .expect("Should restore session");

    let probes = vec![
        vec!["asteroid", "plants"],
        vec!["asteroid", "comet", "meteor"],
    ];
    let probes = SequenceBatch::build(&probes, &vocab, &table).expect("Should build probes");

    let ranked = session.rank(&probes, &candidates).expect("Should rank");
    assert_eq!(ranked.len(), 2);
    for row in &ranked {
        assert_eq!(row.len(), 1);
        assert!(row[0] < 12);
    }
}
