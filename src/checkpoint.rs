//! Checkpoint persistence for trained parameter bundles.
//!
//! A checkpoint is two sibling files under the configured directory: a
//! safetensors snapshot of every variable in the bundle and a small JSON
//! manifest describing the run that produced it. Restore refuses to guess
//! when either file is missing.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::MatchError;

/// Sidecar metadata written next to each parameter snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub model: String,
    pub hidden_width: usize,
    pub vector_dim: usize,
    pub epochs_completed: usize,
    pub unix_timestamp: u64,
}

/// Filesystem layout and load/save for one named model's checkpoints.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    model_name: String,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(dir: P, model_name: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            model_name: model_name.to_string(),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(format!("{}.safetensors", self.model_name))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.model_name))
    }

    /// True when both the snapshot and its manifest are on disk. A partial
    /// write never counts as a checkpoint.
    pub fn is_present(&self) -> bool {
        self.snapshot_path().is_file() && self.manifest_path().is_file()
    }

    pub fn save(&self, bundle: &VarMap, manifest: &CheckpointManifest) -> Result<(), MatchError> {
        fs::create_dir_all(&self.dir)?;
        bundle.save(self.snapshot_path())?;
        fs::write(self.manifest_path(), serde_json::to_string_pretty(manifest)?)?;

        info!(
            path = %self.snapshot_path().display(),
            epochs = manifest.epochs_completed,
            "Saved checkpoint"
        );
        Ok(())
    }

    /// Fills an already-built bundle with the stored parameter values.
    /// Every variable in `bundle` must exist in the snapshot under the same
    /// name and shape.
    pub fn restore(&self, bundle: &mut VarMap) -> Result<CheckpointManifest, MatchError> {
        if !self.is_present() {
            return Err(MatchError::MissingCheckpoint {
                path: self.snapshot_path(),
            });
        }

        bundle.load(self.snapshot_path())?;
        let manifest: CheckpointManifest =
            serde_json::from_str(&fs::read_to_string(self.manifest_path())?)?;

        info!(
            path = %self.snapshot_path().display(),
            model = %manifest.model,
            epochs = manifest.epochs_completed,
            "Restored checkpoint"
        );
        Ok(manifest)
    }
}

pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
