//! PKI error types

use std::path::PathBuf;

use thiserror::Error;

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Certificate generation or signing failed
    #[error("certificate generation failed: {0}")]
    CertificateGeneration(String),

    /// Certificate or key parsing error
    #[error("certificate parsing error: {0}")]
    Parse(String),

    /// Externally supplied root CA material was rejected
    #[error("invalid external root CA {path}: {reason}")]
    InvalidExternalCa {
        /// File that failed validation
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// The service network range could not yield a host address
    #[error("invalid service CIDR '{cidr}': {reason}")]
    InvalidServiceCidr {
        /// CIDR as configured
        cidr: String,
        /// Why no host address could be derived
        reason: String,
    },

    /// Writing or copying an artifact failed
    #[error("failed to persist {path}: {source}")]
    Persist {
        /// Destination path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Minting a named identity failed; the bootstrap is aborted
    #[error("failed to generate {identity}: {source}")]
    Mint {
        /// Identity being minted (e.g. "kube-ca", "apiserver")
        identity: String,
        /// What went wrong
        #[source]
        source: Box<PkiError>,
    },
}

impl PkiError {
    /// Wrap an error with the name of the identity being minted
    pub fn mint(identity: impl Into<String>, source: PkiError) -> Self {
        Self::Mint {
            identity: identity.into(),
            source: Box::new(source),
        }
    }

    /// Create an external CA validation error
    pub fn invalid_external_ca(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidExternalCa {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a persistence error for the given path
    pub fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.into(),
            source,
        }
    }

    /// Identity that failed to mint, if this is a mint error
    pub fn identity(&self) -> Option<&str> {
        match self {
            PkiError::Mint { identity, .. } => Some(identity),
            _ => None,
        }
    }
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;
