//! Sequential step engine
//!
//! A [`Workflow`] is an ordered list of [`Step`]s bound at construction. The
//! engine awaits each one before starting the next and stops at the first
//! error, returning it as-is. Platform differences are the steps' business.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::ClusterConfig;
use crate::drain::WorkerDrain;
use crate::error::{Result, WorkflowError};
use crate::provisioner::Provisioner;
use crate::registry::StepRegistry;
use crate::state::StateTracker;

/// Everything a step may touch
pub struct WorkflowContext {
    /// Cluster working directory
    pub cluster_dir: PathBuf,
    /// Template lookup
    pub registry: StepRegistry,
    /// State artifact lookup
    pub state: StateTracker,
    /// Infrastructure executor
    pub provisioner: Arc<dyn Provisioner>,
    /// Worker pool drain
    pub drainer: Arc<dyn WorkerDrain>,
    config: Option<ClusterConfig>,
}

impl WorkflowContext {
    /// Context for the cluster in `cluster_dir`
    pub fn new(
        cluster_dir: impl Into<PathBuf>,
        registry: StepRegistry,
        provisioner: Arc<dyn Provisioner>,
        drainer: Arc<dyn WorkerDrain>,
    ) -> Self {
        let cluster_dir = cluster_dir.into();
        Self {
            state: StateTracker::new(&cluster_dir),
            cluster_dir,
            registry,
            provisioner,
            drainer,
            config: None,
        }
    }

    /// Cluster working directory
    pub fn cluster_dir(&self) -> &Path {
        &self.cluster_dir
    }

    /// Configuration loaded by an earlier step
    pub fn config(&self) -> Result<&ClusterConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| WorkflowError::config("cluster config has not been loaded"))
    }

    /// Install the cluster configuration
    pub fn set_config(&mut self, config: ClusterConfig) {
        self.config = Some(config);
    }
}

/// One unit of a workflow
#[async_trait]
pub trait Step: Send + Sync {
    /// Name used in logs
    fn name(&self) -> String;

    /// Do the work
    async fn run(&self, ctx: &mut WorkflowContext) -> Result<()>;
}

/// An ordered sequence of steps
pub struct Workflow {
    name: String,
    steps: Vec<Box<dyn Step>>,
}

impl Workflow {
    /// Bind `steps` in order
    pub fn new(name: impl Into<String>, steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Step names in execution order
    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Run every step in order, stopping at the first failure
    pub async fn run(&self, ctx: &mut WorkflowContext) -> Result<()> {
        info!(workflow = %self.name, steps = self.steps.len(), "Starting workflow");
        for step in &self.steps {
            let name = step.name();
            info!(workflow = %self.name, step = %name, "Running step");
            step.run(ctx).await?;
        }
        info!(workflow = %self.name, "Workflow complete");
        Ok(())
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish()
    }
}
