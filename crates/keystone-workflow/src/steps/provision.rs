//! Apply and destroy steps over the infrastructure executor

use async_trait::async_trait;
use tracing::info;

use crate::engine::{Step, WorkflowContext};
use crate::error::{Result, WorkflowError};
use crate::registry::LifecycleStep;

/// Apply `step`
///
/// Always invokes the executor. The state artifact is written as soon as an
/// apply starts, so its presence says nothing about whether the apply
/// finished; re-applying a converged step is a no-op for terraform.
pub async fn run_apply_step(ctx: &WorkflowContext, step: &LifecycleStep) -> Result<()> {
    let platform = ctx.config()?.platform;
    let template_dir = ctx.registry.template_dir(&step.name, platform)?;
    ctx.state.ensure_dir()?;

    info!(step = %step.name, template = %template_dir.display(), "Applying");
    ctx.provisioner
        .apply(&step.name, &template_dir, &step.extra_args)
        .await
        .map_err(|e| WorkflowError::provisioner(&step.name, e))
}

/// Destroy `step` if it was applied
///
/// A step without a state artifact was never applied (or is already gone),
/// which counts as success without touching the executor.
pub async fn run_destroy_step(ctx: &WorkflowContext, step: &LifecycleStep) -> Result<()> {
    if !ctx.state.has_state(&step.name) {
        info!(step = %step.name, "No state, nothing to destroy");
        return Ok(());
    }

    let platform = ctx.config()?.platform;
    let template_dir = ctx.registry.template_dir(&step.name, platform)?;

    info!(step = %step.name, template = %template_dir.display(), "Destroying");
    ctx.provisioner
        .destroy(&step.name, &template_dir, &step.extra_args)
        .await
        .map_err(|e| WorkflowError::provisioner(&step.name, e))?;

    ctx.state.clear(&step.name)
}

/// [`Step`] that applies a lifecycle step
#[derive(Debug, Clone)]
pub struct ApplyStep(pub LifecycleStep);

#[async_trait]
impl Step for ApplyStep {
    fn name(&self) -> String {
        format!("apply-{}", self.0.name)
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<()> {
        run_apply_step(ctx, &self.0).await
    }
}

/// [`Step`] that destroys a lifecycle step
#[derive(Debug, Clone)]
pub struct DestroyStep(pub LifecycleStep);

#[async_trait]
impl Step for DestroyStep {
    fn name(&self) -> String {
        format!("destroy-{}", self.0.name)
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<()> {
        run_destroy_step(ctx, &self.0).await
    }
}
