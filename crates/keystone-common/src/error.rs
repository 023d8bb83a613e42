//! Error types shared across Keystone crates
//!
//! Errors carry the operation that produced them so a failed run can be
//! diagnosed from the log line alone.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Shared error type for kube client construction and API access
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The kubeconfig could not be read or did not describe a usable cluster
    #[error("invalid kubeconfig {path}: {message}")]
    Kubeconfig {
        /// Path of the kubeconfig that was loaded
        path: String,
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a kubeconfig error for the given path
    pub fn kubeconfig(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Kubeconfig {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether the API server reported the object as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 404)
    }
}
