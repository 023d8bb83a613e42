//! Provisioning state artifacts
//!
//! The executor leaves `<cluster_dir>/state/<step>.tfstate` behind when a
//! step is applied. Its presence is the only record that the step ran.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, WorkflowError};

/// Answers "was this step applied?" from the state directory
#[derive(Debug, Clone)]
pub struct StateTracker {
    state_dir: PathBuf,
}

impl StateTracker {
    /// Tracker for the cluster rooted at `cluster_dir`
    pub fn new(cluster_dir: &Path) -> Self {
        Self {
            state_dir: keystone_common::state_dir(cluster_dir),
        }
    }

    /// Artifact path of `step`
    pub fn state_path(&self, step: &str) -> PathBuf {
        self.state_dir
            .join(format!("{}.{}", step, keystone_common::STATE_FILE_EXTENSION))
    }

    /// Whether `step` has a state artifact
    pub fn has_state(&self, step: &str) -> bool {
        self.state_path(step).is_file()
    }

    /// Create the state directory
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| WorkflowError::io(&self.state_dir, e))
    }

    /// Forget `step` after it was destroyed
    pub fn clear(&self, step: &str) -> Result<()> {
        let path = self.state_path(step);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(step, "Removed state artifact");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkflowError::io(path, e)),
        }
    }
}
