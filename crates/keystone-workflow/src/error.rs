//! Workflow error types

use std::path::PathBuf;

use thiserror::Error;

use crate::config::Platform;
use crate::drain::DrainError;
use crate::provisioner::ProvisionerError;

/// Errors surfaced by workflow steps
///
/// The engine passes these through untouched; only steps construct them.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Cluster configuration is missing, malformed or inconsistent
    #[error("configuration error: {message}")]
    Config {
        /// What is wrong with the configuration
        message: String,
    },

    /// A lifecycle step has no template for the active platform
    #[error("step {step} has no template for platform {platform} (looked in {template_dir})")]
    UnsupportedPlatform {
        /// Step name
        step: String,
        /// Active platform
        platform: Platform,
        /// Directory that was expected to exist
        template_dir: PathBuf,
    },

    /// The infrastructure executor failed
    #[error("step {step} failed: {source}")]
    Provisioner {
        /// Step name
        step: String,
        /// Executor error
        #[source]
        source: ProvisionerError,
    },

    /// Reading or writing the cluster directory failed
    #[error("io error on {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// TLS bootstrap failed
    #[error("TLS bootstrap failed: {0}")]
    Pki(#[from] keystone_pki::PkiError),

    /// Draining the worker pool failed under a policy that treats it as fatal
    #[error("worker drain failed: {0}")]
    Drain(#[from] DrainError),
}

impl WorkflowError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an IO error for the given path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap an executor error with the step it belongs to
    pub fn provisioner(step: impl Into<String>, source: ProvisionerError) -> Self {
        Self::Provisioner {
            step: step.into(),
            source,
        }
    }
}

/// Result type for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;
