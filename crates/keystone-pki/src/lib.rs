//! Cluster trust hierarchy for Keystone
//!
//! This crate mints every certificate and key a new cluster needs and lays
//! them out under `<cluster_dir>/generated/tls/`:
//!
//! - [`CertAuthority`]: signing capability (self-signed roots, issuer-signed leaves)
//! - [`CertStore`]: role-named persistence with fixed file modes
//! - [`PkiBootstrap`]: the ordered mint of the whole hierarchy
//!
//! # Architecture
//!
//! The bootstrap is synchronous and single-threaded. Signing pairs stay in
//! memory for the duration of a run and are written once; a failed run leaves
//! a directory that must be discarded.

#![deny(missing_docs)]

pub mod authority;
pub mod bootstrap;
pub mod error;
pub mod profile;
pub mod store;

pub use authority::{CertAuthority, RsaAuthority, SigningPair};
pub use bootstrap::{cidr_host, ClusterIdentity, PkiBootstrap};
pub use error::{PkiError, Result};
pub use profile::CertProfile;
pub use store::{CertRole, CertStore, ExternalRootCa};

/// Decode the first PEM block in `pem_data` to DER, requiring label `tag`
pub fn parse_pem(pem_data: &str, tag: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::Parse(format!("failed to parse PEM: {}", e)))?;
    if pem_obj.tag() != tag {
        return Err(PkiError::Parse(format!(
            "expected {} block, found {}",
            tag,
            pem_obj.tag()
        )));
    }
    Ok(pem_obj.contents().to_vec())
}
