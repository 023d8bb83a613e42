//! Destroy command - tear a cluster down in reverse order

use std::time::Duration;

use clap::Args;
use tracing::info;

use keystone_workflow::{destroy_workflow, DrainConfig};

use super::ClusterArgs;
use crate::Result;

/// Drain workers and destroy every provisioned step
#[derive(Args, Debug)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Seconds between worker pool observations while draining
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u64).range(1..))]
    pub drain_poll_secs: u64,

    /// Seconds to wait for the worker pool to reach zero
    #[arg(long, default_value = "60")]
    pub drain_timeout_secs: u64,
}

impl DestroyArgs {
    fn drain_config(&self) -> DrainConfig {
        DrainConfig {
            poll_interval: Duration::from_secs(self.drain_poll_secs),
            timeout: Duration::from_secs(self.drain_timeout_secs),
        }
    }
}

/// Run the destroy workflow
pub async fn run(args: DestroyArgs) -> Result<()> {
    let mut ctx = args.cluster.context(args.drain_config())?;
    destroy_workflow().run(&mut ctx).await?;
    info!(cluster_dir = %args.cluster.cluster_dir.display(), "Cluster destroyed");
    Ok(())
}
