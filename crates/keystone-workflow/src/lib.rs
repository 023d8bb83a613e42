//! Cluster lifecycle workflows for Keystone
//!
//! A cluster is brought up and torn down by running an ordered list of steps
//! against its working directory:
//!
//! - [`engine`]: the sequential [`Workflow`] runner and [`WorkflowContext`]
//! - [`registry`] / [`state`]: template lookup and "was this applied?" checks
//! - [`provisioner`]: the terraform executor behind [`Provisioner`]
//! - [`drain`]: scaling the worker pool to zero before teardown
//! - [`steps`]: concrete steps and the [`create_workflow`] / [`destroy_workflow`] assemblies
//!
//! Steps run one at a time; the first failure stops the run and nothing is
//! rolled back. Re-running create re-applies every step and relies on the
//! executor converging; re-running destroy skips steps whose artifact is gone.

#![deny(missing_docs)]

pub mod config;
pub mod drain;
pub mod engine;
pub mod error;
pub mod provisioner;
pub mod registry;
pub mod state;
pub mod steps;

pub use config::{ClusterConfig, DrainPolicy, Platform};
pub use drain::{
    drain_worker_pool, ClusterDrainer, DrainConfig, DrainError, KubeWorkerDrain, MachineSetClient,
    WorkerDrain, WorkerPoolClient, WorkerPoolRef,
};
pub use engine::{Step, Workflow, WorkflowContext};
pub use error::{Result, WorkflowError};
pub use provisioner::{Provisioner, ProvisionerError, TerraformProvisioner};
pub use registry::{LifecycleStep, StepRegistry};
pub use state::StateTracker;
pub use steps::{create_workflow, destroy_workflow, run_destroy_step, tls_workflow};
