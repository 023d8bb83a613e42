//! CLI commands

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::debug;

use keystone_workflow::{
    DrainConfig, KubeWorkerDrain, StepRegistry, TerraformProvisioner, WorkflowContext,
};

use crate::{Error, Result};

pub mod create;
pub mod destroy;
pub mod tls;

/// Where the cluster and its templates live
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Cluster working directory (holds config.yaml, state and generated assets)
    #[arg(long = "dir", env = "KEYSTONE_CLUSTER_DIR", default_value = ".")]
    pub cluster_dir: PathBuf,

    /// Root of the step templates (`<step>/<platform>/`)
    #[arg(long = "templates", env = "KEYSTONE_TEMPLATES_DIR", default_value = "templates")]
    pub templates_dir: PathBuf,

    /// Terraform binary
    #[arg(long, env = "KEYSTONE_TERRAFORM", default_value = "terraform")]
    pub terraform: PathBuf,
}

impl ClusterArgs {
    /// Build a workflow context over the real executor and cluster API
    pub fn context(&self, drain: DrainConfig) -> Result<WorkflowContext> {
        if !self.templates_dir.is_dir() {
            return Err(Error::TemplatesNotFound {
                path: self.templates_dir.clone(),
            });
        }
        self.local_context(drain)
    }

    /// Build a workflow context for workflows that never read templates
    pub fn local_context(&self, drain: DrainConfig) -> Result<WorkflowContext> {
        if !self.cluster_dir.is_dir() {
            return Err(Error::ClusterDirNotFound {
                path: self.cluster_dir.clone(),
            });
        }

        debug!(
            cluster_dir = %self.cluster_dir.display(),
            templates = %self.templates_dir.display(),
            "Building workflow context"
        );
        let provisioner = TerraformProvisioner::new(&self.cluster_dir).with_binary(&self.terraform);
        Ok(WorkflowContext::new(
            self.cluster_dir.clone(),
            StepRegistry::new(self.templates_dir.clone()),
            Arc::new(provisioner),
            Arc::new(KubeWorkerDrain::new(drain)),
        ))
    }
}
