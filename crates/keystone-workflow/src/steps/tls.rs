//! TLS hierarchy step

use async_trait::async_trait;
use tracing::info;

use keystone_pki::{CertRole, CertStore, PkiBootstrap, RsaAuthority};

use crate::engine::{Step, WorkflowContext};
use crate::error::Result;

/// Generate the cluster PKI under `generated/tls`
///
/// The service account keypair is the last artifact written, so its presence
/// means an earlier run finished and the hierarchy is left alone. Anything
/// short of that is regenerated from scratch.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateTls;

#[async_trait]
impl Step for GenerateTls {
    fn name(&self) -> String {
        "generate-tls".to_string()
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<()> {
        let config = ctx.config()?;
        let store = CertStore::new(ctx.cluster_dir());

        if store.paths(CertRole::ServiceAccount).key.is_file() {
            info!(dir = %store.dir().display(), "TLS hierarchy already present, skipping");
            return Ok(());
        }

        let identity = config.identity();
        let external = config.external_root_ca(ctx.cluster_dir());
        PkiBootstrap::new(&RsaAuthority, &store, &identity).run(external.as_ref())?;
        Ok(())
    }
}
