//! Environment-backed configuration.
//!
//! Every setting has a default. Override with `SIMNET_*` environment
//! variables; numeric overrides that fail to parse are rejected rather than
//! silently replaced.

use std::env;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_CHECKPOINT_DIR, DEFAULT_EPOCH_COUNT, DEFAULT_GAMMA, DEFAULT_HIDDEN_WIDTH,
    DEFAULT_LEARNING_RATE, DEFAULT_MODEL_NAME, DEFAULT_SEED, DEFAULT_TOP_K,
};
use crate::error::MatchError;

/// Hyperparameters and persistence settings for the match graph.
///
/// Use [`MatchConfig::from_env`] to read `SIMNET_*` overrides on top of
/// defaults, then [`validate`](MatchConfig::validate) before building a
/// trainer or inference session.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Hidden width of each recurrent layer. Default: `512`.
    pub hidden_width: usize,

    /// Adam learning rate. Default: `0.01`.
    pub learning_rate: f64,

    /// Passes over the training set. Default: `200`.
    pub epoch_count: usize,

    /// Cosine smoothing factor. Default: `20.0`.
    pub gamma: f64,

    /// Minibatch size; `0` means one batch spanning the whole dataset.
    pub batch_size: usize,

    /// Ranked candidates returned per query. Default: `1`.
    pub top_k: usize,

    /// Seed for rotation offsets and the unknown-vector draw. Default: `42`.
    pub seed: u64,

    /// Directory the snapshot and manifest are written under.
    pub checkpoint_dir: PathBuf,

    /// File stem for the snapshot and manifest. Default: `gru-dssm`.
    pub model_name: String,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            hidden_width: DEFAULT_HIDDEN_WIDTH,
            learning_rate: DEFAULT_LEARNING_RATE,
            epoch_count: DEFAULT_EPOCH_COUNT,
            gamma: DEFAULT_GAMMA,
            batch_size: 0,
            top_k: DEFAULT_TOP_K,
            seed: DEFAULT_SEED,
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            model_name: DEFAULT_MODEL_NAME.to_string(),
        }
    }
}

impl MatchConfig {
    const ENV_HIDDEN_WIDTH: &'static str = "SIMNET_HIDDEN_WIDTH";
    const ENV_LEARNING_RATE: &'static str = "SIMNET_LEARNING_RATE";
    const ENV_EPOCHS: &'static str = "SIMNET_EPOCHS";
    const ENV_GAMMA: &'static str = "SIMNET_GAMMA";
    const ENV_BATCH_SIZE: &'static str = "SIMNET_BATCH_SIZE";
    const ENV_TOP_K: &'static str = "SIMNET_TOP_K";
    const ENV_SEED: &'static str = "SIMNET_SEED";
    const ENV_CHECKPOINT_DIR: &'static str = "SIMNET_CHECKPOINT_DIR";
    const ENV_MODEL_NAME: &'static str = "SIMNET_MODEL_NAME";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, MatchError> {
        let defaults = Self::default();

        Ok(Self {
            hidden_width: Self::parse_usize_from_env(Self::ENV_HIDDEN_WIDTH, defaults.hidden_width)?,
            learning_rate: Self::parse_f64_from_env(
                Self::ENV_LEARNING_RATE,
                defaults.learning_rate,
            )?,
            epoch_count: Self::parse_usize_from_env(Self::ENV_EPOCHS, defaults.epoch_count)?,
            gamma: Self::parse_f64_from_env(Self::ENV_GAMMA, defaults.gamma)?,
            batch_size: Self::parse_usize_from_env(Self::ENV_BATCH_SIZE, defaults.batch_size)?,
            top_k: Self::parse_usize_from_env(Self::ENV_TOP_K, defaults.top_k)?,
            seed: Self::parse_u64_from_env(Self::ENV_SEED, defaults.seed)?,
            checkpoint_dir: Self::parse_path_from_env(
                Self::ENV_CHECKPOINT_DIR,
                defaults.checkpoint_dir,
            ),
            model_name: Self::parse_string_from_env(Self::ENV_MODEL_NAME, defaults.model_name),
        })
    }

    /// Validates ranges and the checkpoint location (does not create directories).
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.hidden_width == 0 {
            return Err(invalid("hidden_width must be greater than zero"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(invalid("learning_rate must be finite and positive"));
        }
        if self.epoch_count == 0 {
            return Err(invalid("epoch_count must be greater than zero"));
        }
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(invalid("gamma must be finite and positive"));
        }
        if self.top_k == 0 {
            return Err(invalid("top_k must be greater than zero"));
        }
        if self.model_name.trim().is_empty() {
            return Err(invalid("model_name must not be empty"));
        }
        if self.checkpoint_dir.as_os_str().is_empty() {
            return Err(invalid("checkpoint_dir must not be empty"));
        }
        if self.checkpoint_dir.exists() && !self.checkpoint_dir.is_dir() {
            return Err(invalid(&format!(
                "checkpoint_dir {} is not a directory",
                self.checkpoint_dir.display()
            )));
        }
        Ok(())
    }

    /// Resolves the effective minibatch size for a dataset of `dataset_size` rows.
    pub fn effective_batch_size(&self, dataset_size: usize) -> usize {
        if self.batch_size == 0 {
            dataset_size
        } else {
            self.batch_size
        }
    }

    fn parse_usize_from_env(var_name: &'static str, default: usize) -> Result<usize, MatchError> {
        match env::var(var_name) {
            Ok(value) => value.trim().parse().map_err(|_| MatchError::InvalidConfig {
                reason: format!("{var_name} must be a non-negative integer, got '{value}'"),
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_u64_from_env(var_name: &'static str, default: u64) -> Result<u64, MatchError> {
        match env::var(var_name) {
            Ok(value) => value.trim().parse().map_err(|_| MatchError::InvalidConfig {
                reason: format!("{var_name} must be a non-negative integer, got '{value}'"),
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_f64_from_env(var_name: &'static str, default: f64) -> Result<f64, MatchError> {
        match env::var(var_name) {
            Ok(value) => value.trim().parse().map_err(|_| MatchError::InvalidConfig {
                reason: format!("{var_name} must be a number, got '{value}'"),
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_path_from_env(var_name: &'static str, default: PathBuf) -> PathBuf {
        env::var(var_name).map(PathBuf::from).unwrap_or(default)
    }

    fn parse_string_from_env(var_name: &'static str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }
}

fn invalid(reason: &str) -> MatchError {
    MatchError::InvalidConfig {
        reason: reason.to_string(),
    }
}
