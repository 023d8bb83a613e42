//! TLS command - generate only the trust hierarchy

use clap::Args;
use tracing::info;

use keystone_workflow::{tls_workflow, DrainConfig};

use super::ClusterArgs;
use crate::Result;

/// Generate the TLS hierarchy under `generated/tls`
#[derive(Args, Debug)]
pub struct TlsArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,
}

/// Run the TLS workflow
pub async fn run(args: TlsArgs) -> Result<()> {
    let mut ctx = args.cluster.local_context(DrainConfig::default())?;
    tls_workflow().run(&mut ctx).await?;
    info!(cluster_dir = %args.cluster.cluster_dir.display(), "TLS assets generated");
    Ok(())
}
