//! Cross-cutting, shared constants.
//!
//! Training hyperparameters default to the values the model family was tuned
//! with; override them through [`MatchConfig`](crate::config::MatchConfig)
//! rather than editing these.

/// Hidden width of each recurrent layer (and of the encoded state).
pub const DEFAULT_HIDDEN_WIDTH: usize = 512;

/// Adam learning rate.
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;

/// Number of passes over the full training set.
pub const DEFAULT_EPOCH_COUNT: usize = 200;

/// Cosine smoothing factor applied before the softmax.
pub const DEFAULT_GAMMA: f64 = 20.0;

/// Number of ranked candidates returned per query.
pub const DEFAULT_TOP_K: usize = 1;

/// Seed for the rotation-offset generator and the unknown-vector draw.
pub const DEFAULT_SEED: u64 = 42;

/// Directory checkpoints are written under.
pub const DEFAULT_CHECKPOINT_DIR: &str = "./model";

/// File stem for the parameter snapshot and its manifest.
pub const DEFAULT_MODEL_NAME: &str = "gru-dssm";

/// Probability of dropping an inter-layer activation during training.
pub const INTERLAYER_DROPOUT: f32 = 0.5;

/// Joint global-norm ceiling applied to all gradients before the update.
pub const GRAD_CLIP_NORM: f64 = 5.0;

/// The negative-sample count is derived as `dataset_size / 10`.
pub const NEGATIVE_SAMPLE_DIVISOR: usize = 10;

/// Floor applied to vector norms before cosine division.
pub const COSINE_NORM_FLOOR: f64 = 1e-8;

/// Ceiling paired with [`COSINE_NORM_FLOOR`] when clamping norms.
pub const COSINE_NORM_CEILING: f64 = 1e10;

/// Derives the in-batch negative-sample count for a dataset.
///
/// Datasets smaller than [`NEGATIVE_SAMPLE_DIVISOR`] get zero negatives,
/// which degenerates the contrastive loss to a constant; callers that want
/// a trainable setup need at least ten examples.
pub fn negative_sample_count(dataset_size: usize) -> usize {
    dataset_size / NEGATIVE_SAMPLE_DIVISOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_sample_count_divides() {
        assert_eq!(negative_sample_count(100), 10);
        assert_eq!(negative_sample_count(45), 4);
    }

    #[test]
    fn test_negative_sample_count_small_dataset() {
        assert_eq!(negative_sample_count(9), 0);
        assert_eq!(negative_sample_count(0), 0);
    }

    #[test]
    fn test_clip_threshold_positive() {
        assert!(GRAD_CLIP_NORM > 0.0);
        assert!(COSINE_NORM_FLOOR > 0.0);
        assert!(COSINE_NORM_FLOOR < COSINE_NORM_CEILING);
    }
}
