//! Steps shared by both workflows: configuration and terraform variables

use async_trait::async_trait;
use tracing::info;

use crate::config::ClusterConfig;
use crate::engine::{Step, WorkflowContext};
use crate::error::{Result, WorkflowError};

/// Load and validate `config.yaml` into the context
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadClusterConfig;

#[async_trait]
impl Step for ReadClusterConfig {
    fn name(&self) -> String {
        "read-config".to_string()
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<()> {
        let config = ClusterConfig::load(ctx.cluster_dir())?;
        info!(
            cluster = %config.name,
            platform = %config.platform,
            "Loaded cluster config"
        );
        ctx.set_config(config);
        Ok(())
    }
}

/// Write `terraform.tfvars.json` from the loaded configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateVariables;

#[async_trait]
impl Step for GenerateVariables {
    fn name(&self) -> String {
        "generate-variables".to_string()
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<()> {
        let vars = ctx.config()?.terraform_variables(ctx.cluster_dir());
        let path = keystone_common::tfvars_path(ctx.cluster_dir());
        let body = serde_json::to_vec_pretty(&vars)
            .map_err(|e| WorkflowError::config(format!("failed to encode variables: {}", e)))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| WorkflowError::io(&path, e))?;
        info!(path = %path.display(), "Wrote terraform variables");
        Ok(())
    }
}
