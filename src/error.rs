//! Crate-wide error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by batch construction, the match graph, and persistence.
///
/// Out-of-vocabulary tokens are deliberately absent: they resolve to the
/// reserved unknown slot and are never an error.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Batch sizes or dimensions disagree with what the graph expects.
    #[error("shape mismatch: {reason}")]
    ShapeMismatch { reason: String },

    /// A sequence row has no real tokens; rejected before any computation.
    #[error("sequence row {row} is empty")]
    EmptySequence { row: usize },

    /// Inference requires a persisted parameter snapshot.
    #[error("no checkpoint found at {}", path.display())]
    MissingCheckpoint { path: PathBuf },

    /// Configuration value out of range or unparseable.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Tensor computation failed in the backend.
    #[error("tensor operation failed: {reason}")]
    Tensor { reason: String },

    /// Checkpoint or manifest I/O failed.
    #[error("checkpoint i/o failed: {reason}")]
    Io { reason: String },
}

impl From<candle_core::Error> for MatchError {
    fn from(err: candle_core::Error) -> Self {
        MatchError::Tensor {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for MatchError {
    fn from(err: std::io::Error) -> Self {
        MatchError::Io {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for MatchError {
    fn from(err: serde_json::Error) -> Self {
        MatchError::Io {
            reason: err.to_string(),
        }
    }
}
