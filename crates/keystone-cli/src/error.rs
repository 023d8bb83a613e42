//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Workflow(#[from] keystone_workflow::WorkflowError),

    #[error("cluster directory not found: {path}")]
    ClusterDirNotFound { path: PathBuf },

    #[error("templates directory not found: {path}")]
    TemplatesNotFound { path: PathBuf },
}
