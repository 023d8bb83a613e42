//! Worker drain step

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::DrainPolicy;
use crate::engine::{Step, WorkflowContext};
use crate::error::{Result, WorkflowError};

/// Scale the worker pool to zero before its infrastructure is destroyed
///
/// Runs only while `infra_step` still has state; without it there are no
/// workers and no API to talk to. Failures are fatal or logged depending on
/// the cluster's [`DrainPolicy`].
#[derive(Debug, Clone)]
pub struct DrainWorkers {
    infra_step: String,
}

impl DrainWorkers {
    /// Drain guarded by the state of `infra_step`
    pub fn new(infra_step: impl Into<String>) -> Self {
        Self {
            infra_step: infra_step.into(),
        }
    }
}

#[async_trait]
impl Step for DrainWorkers {
    fn name(&self) -> String {
        "drain-workers".to_string()
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<()> {
        let config = ctx.config()?;
        let policy = config.drain_policy();

        if policy == DrainPolicy::Skip {
            info!(platform = %config.platform, "Worker drain disabled, skipping");
            return Ok(());
        }
        if !ctx.state.has_state(&self.infra_step) {
            info!(step = %self.infra_step, "No infrastructure state, nothing to drain");
            return Ok(());
        }

        let kubeconfig = keystone_common::kubeconfig_path(ctx.cluster_dir());
        match ctx.drainer.drain(&kubeconfig, &config.worker_pool).await {
            Ok(()) => Ok(()),
            Err(e) if policy == DrainPolicy::BestEffort => {
                warn!(
                    pool = %config.worker_pool,
                    platform = %config.platform,
                    error = %e,
                    "Worker drain failed, continuing teardown"
                );
                Ok(())
            }
            Err(e) => Err(WorkflowError::Drain(e)),
        }
    }
}
