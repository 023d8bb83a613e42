//! Create command - bring a cluster up from its working directory

use clap::Args;
use tracing::info;

use keystone_workflow::{create_workflow, DrainConfig};

use super::ClusterArgs;
use crate::Result;

/// Generate TLS assets and apply every infrastructure step
#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,
}

/// Run the create workflow
pub async fn run(args: CreateArgs) -> Result<()> {
    let mut ctx = args.cluster.context(DrainConfig::default())?;
    create_workflow().run(&mut ctx).await?;
    info!(cluster_dir = %args.cluster.cluster_dir.display(), "Cluster created");
    Ok(())
}
