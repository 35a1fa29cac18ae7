//! Simnet match library crate (used by training pipelines and integration tests).
//!
//! # Public API Surface
//!
//! This crate exposes the full match pipeline so training jobs and
//! integration tests can drive it piece by piece. The exports are organized
//! by module:
//!
//! ## Core Types (Stable)
//! - [`MatchConfig`], [`MatchError`] - Configuration and the error taxonomy
//! - [`Vocabulary`], [`VectorTable`] - Token dictionary and its embedding rows
//! - [`SequenceBatch`] - Padded id batches with per-row lengths
//!
//! ## Encoding & Scoring
//! - [`SequenceEncoder`], [`GruCell`] - Two-layer recurrent encoder
//! - [`Matcher`], [`TrainingMatcher`], [`InferenceMatcher`] - Similarity scoring
//! - [`contrastive_loss`], [`accuracy`], [`rank_top_k`] - Objective and ranking helpers
//!
//! ## Training & Serving
//! - [`Trainer`], [`TrainReport`], [`EpochStats`] - Minibatch training loop
//! - [`InferenceSession`] - Checkpoint-backed ranking
//! - [`CheckpointStore`], [`CheckpointManifest`] - Snapshot persistence
//! - [`select_device`] - Feature-gated compute device selection
//!
//! ## Constants
//! Default hyperparameters are exported for consistency across pipelines.
//! Prefer [`MatchConfig::from_env`] for runtime configuration.

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod device;
pub mod encoder;
pub mod error;
pub mod matcher;
pub mod trainer;
pub mod vocab;

pub use batch::SequenceBatch;
pub use checkpoint::{CheckpointManifest, CheckpointStore};
pub use config::MatchConfig;
pub use constants::{
    DEFAULT_EPOCH_COUNT, DEFAULT_GAMMA, DEFAULT_HIDDEN_WIDTH, DEFAULT_LEARNING_RATE,
    DEFAULT_TOP_K, GRAD_CLIP_NORM, INTERLAYER_DROPOUT, NEGATIVE_SAMPLE_DIVISOR,
    negative_sample_count,
};
pub use device::select_device;
pub use encoder::{GruCell, SequenceEncoder};
pub use error::MatchError;
pub use matcher::{
    InferenceMatcher, Matcher, TrainingMatcher, accuracy, contrastive_loss, rank_top_k,
};
pub use trainer::{EpochStats, InferenceSession, TrainReport, Trainer};
pub use vocab::{VectorTable, Vocabulary};
