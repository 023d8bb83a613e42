//! On-disk layout of the trust hierarchy
//!
//! Every identity has a fixed, role-named location under
//! `<cluster_dir>/generated/tls/`. The role→path table is built once when the
//! store is created and every writer goes through it.
//!
//! Private keys are written 0600 and certificates 0644 on Unix.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rcgen::KeyPair;
use tracing::{debug, info};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::authority::{is_rsa_key, SigningPair};
use crate::error::{PkiError, Result};

const KEY_MODE: u32 = 0o600;
const CERT_MODE: u32 = 0o644;

/// Every artifact the bootstrap produces, named by the role it plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CertRole {
    /// Root of the hierarchy
    RootCa,
    /// Signs kube-facing leaves
    KubeCa,
    /// Signs etcd client certificates
    EtcdCa,
    /// Alias of the etcd CA for consumers expecting that name
    EtcdClientCa,
    /// etcd client certificate
    EtcdClient,
    /// Signs aggregation-layer leaves
    AggregatorCa,
    /// Signs in-cluster serving certificates at runtime
    ServiceServingCa,
    /// Alias of the kube CA certificate for the ingress operator
    IngressCa,
    /// Wildcard ingress certificate
    Ingress,
    /// `system:admin` client certificate
    Admin,
    /// Kube API server serving certificate
    ApiServer,
    /// OpenShift API server serving certificate
    OpenshiftApiServer,
    /// Front proxy client certificate
    ApiServerProxy,
    /// Kubelet bootstrap client certificate
    Kubelet,
    /// Node controller serving certificate
    Tnc,
    /// Cluster API aggregated server certificate
    ClusterApiServer,
    /// Service account token signing keypair
    ServiceAccount,
}

impl CertRole {
    /// All roles in bootstrap order
    pub const ALL: [CertRole; 17] = [
        CertRole::RootCa,
        CertRole::KubeCa,
        CertRole::EtcdCa,
        CertRole::EtcdClientCa,
        CertRole::EtcdClient,
        CertRole::AggregatorCa,
        CertRole::ServiceServingCa,
        CertRole::IngressCa,
        CertRole::Ingress,
        CertRole::Admin,
        CertRole::ApiServer,
        CertRole::OpenshiftApiServer,
        CertRole::ApiServerProxy,
        CertRole::Kubelet,
        CertRole::Tnc,
        CertRole::ClusterApiServer,
        CertRole::ServiceAccount,
    ];

    /// File stem shared by the role's artifacts
    pub fn name(self) -> &'static str {
        match self {
            CertRole::RootCa => "root-ca",
            CertRole::KubeCa => "kube-ca",
            CertRole::EtcdCa => "etcd-ca",
            CertRole::EtcdClientCa => "etcd-client-ca",
            CertRole::EtcdClient => "etcd-client",
            CertRole::AggregatorCa => "aggregator-ca",
            CertRole::ServiceServingCa => "service-serving-ca",
            CertRole::IngressCa => "ingress-ca",
            CertRole::Ingress => "ingress",
            CertRole::Admin => "admin",
            CertRole::ApiServer => "apiserver",
            CertRole::OpenshiftApiServer => "openshift-apiserver",
            CertRole::ApiServerProxy => "apiserver-proxy",
            CertRole::Kubelet => "kubelet",
            CertRole::Tnc => "tnc",
            CertRole::ClusterApiServer => "cluster-apiserver-ca",
            CertRole::ServiceAccount => "service-account",
        }
    }

    /// Extension of the public half (`crt` for certificates, `pub` for bare keys)
    fn public_extension(self) -> &'static str {
        match self {
            CertRole::ServiceAccount => "pub",
            _ => "crt",
        }
    }
}

impl std::fmt::Display for CertRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a role's artifacts live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePaths {
    /// Certificate (or public key for bare keypairs)
    pub cert: PathBuf,
    /// Private key
    pub key: PathBuf,
}

/// Root CA material supplied by the operator instead of being generated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRootCa {
    /// PEM certificate file
    pub cert_path: PathBuf,
    /// PEM private key file (RSA)
    pub key_path: PathBuf,
}

/// Persists signing pairs at their role paths
#[derive(Debug, Clone)]
pub struct CertStore {
    dir: PathBuf,
    table: BTreeMap<CertRole, RolePaths>,
}

impl CertStore {
    /// Store rooted at `<cluster_dir>/generated/tls`
    pub fn new(cluster_dir: &Path) -> Self {
        Self::at(keystone_common::tls_dir(cluster_dir))
    }

    /// Store rooted directly at `dir`
    pub fn at(dir: PathBuf) -> Self {
        let table = CertRole::ALL
            .into_iter()
            .map(|role| {
                let paths = RolePaths {
                    cert: dir.join(format!("{}.{}", role.name(), role.public_extension())),
                    key: dir.join(format!("{}.key", role.name())),
                };
                (role, paths)
            })
            .collect();
        Self { dir, table }
    }

    /// Directory holding every artifact
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths for a role
    pub fn paths(&self, role: CertRole) -> &RolePaths {
        // The table is built from CertRole::ALL, so every role is present
        &self.table[&role]
    }

    /// Create the TLS directory if needed
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| PkiError::persist(&self.dir, e))
    }

    /// Write a signing pair at its role paths
    ///
    /// With `embed_issuer`, the certificate file holds the leaf PEM followed
    /// by the issuer PEM.
    pub fn write_pair(
        &self,
        role: CertRole,
        pair: &SigningPair,
        embed_issuer: Option<&SigningPair>,
    ) -> Result<()> {
        let paths = self.paths(role);
        write_file(&paths.key, pair.key_pem().as_bytes(), KEY_MODE)?;

        let mut content = pair.cert_pem().to_string();
        if let Some(issuer) = embed_issuer {
            if !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(issuer.cert_pem());
        }
        write_file(&paths.cert, content.as_bytes(), CERT_MODE)?;

        debug!(role = %role, combined = embed_issuer.is_some(), "Wrote signing pair");
        Ok(())
    }

    /// Copy one role's artifacts under another role's name
    ///
    /// The key is copied only when `with_key` is set.
    pub fn write_alias(&self, source: CertRole, alias: CertRole, with_key: bool) -> Result<()> {
        let from = self.paths(source);
        let to = self.paths(alias);

        copy_file(&from.cert, &to.cert, CERT_MODE)?;
        if with_key {
            copy_file(&from.key, &to.key, KEY_MODE)?;
        }

        debug!(source = %source, alias = %alias, "Wrote alias");
        Ok(())
    }

    /// Write a bare keypair: private key plus exported public key
    pub fn write_key_pair(&self, role: CertRole, key: &KeyPair) -> Result<()> {
        let paths = self.paths(role);
        write_file(&paths.key, key.serialize_pem().as_bytes(), KEY_MODE)?;
        write_file(&paths.cert, key.public_key_pem().as_bytes(), CERT_MODE)?;
        debug!(role = %role, "Wrote keypair");
        Ok(())
    }

    /// Validate an operator-supplied root CA and persist it verbatim
    ///
    /// The files are read as raw bytes and parsed before anything touches the
    /// working directory. The stored certificate is byte-for-byte the
    /// supplied one.
    pub fn import_root_ca(&self, external: &ExternalRootCa) -> Result<SigningPair> {
        let cert_bytes = std::fs::read(&external.cert_path).map_err(|e| {
            PkiError::invalid_external_ca(&external.cert_path, format!("unreadable: {}", e))
        })?;
        let key_bytes = std::fs::read(&external.key_path).map_err(|e| {
            PkiError::invalid_external_ca(&external.key_path, format!("unreadable: {}", e))
        })?;

        let pair = validate_root_ca(external, &cert_bytes, &key_bytes)?;

        let paths = self.paths(CertRole::RootCa);
        write_file(&paths.key, &key_bytes, KEY_MODE)?;
        write_file(&paths.cert, &cert_bytes, CERT_MODE)?;

        info!(cert = %external.cert_path.display(), "Imported external root CA");
        Ok(pair)
    }

    /// Read a role's certificate (or public key) file
    pub fn read_cert(&self, role: CertRole) -> Result<Vec<u8>> {
        let path = &self.paths(role).cert;
        std::fs::read(path).map_err(|e| PkiError::persist(path, e))
    }

    /// Read a role's private key file
    pub fn read_key(&self, role: CertRole) -> Result<Vec<u8>> {
        let path = &self.paths(role).key;
        std::fs::read(path).map_err(|e| PkiError::persist(path, e))
    }
}

/// Parse supplied root CA bytes into a signing pair
fn validate_root_ca(
    external: &ExternalRootCa,
    cert_bytes: &[u8],
    key_bytes: &[u8],
) -> Result<SigningPair> {
    let cert_pem = std::str::from_utf8(cert_bytes)
        .map_err(|_| PkiError::invalid_external_ca(&external.cert_path, "not UTF-8 PEM text"))?;
    let key_pem = std::str::from_utf8(key_bytes)
        .map_err(|_| PkiError::invalid_external_ca(&external.key_path, "not UTF-8 PEM text"))?;

    let der = crate::parse_pem(cert_pem, "CERTIFICATE")
        .map_err(|e| PkiError::invalid_external_ca(&external.cert_path, e.to_string()))?;
    let (_, cert) = X509Certificate::from_der(&der).map_err(|e| {
        PkiError::invalid_external_ca(&external.cert_path, format!("malformed certificate: {}", e))
    })?;
    if !cert.is_ca() {
        return Err(PkiError::invalid_external_ca(
            &external.cert_path,
            "certificate is not a CA",
        ));
    }

    let key = KeyPair::from_pem(key_pem).map_err(|e| {
        PkiError::invalid_external_ca(&external.key_path, format!("malformed private key: {}", e))
    })?;
    if !is_rsa_key(&key) {
        return Err(PkiError::invalid_external_ca(
            &external.key_path,
            "private key is not RSA",
        ));
    }
    if key.public_key_raw() != &*cert.public_key().subject_public_key.data {
        return Err(PkiError::invalid_external_ca(
            &external.key_path,
            "private key does not match certificate",
        ));
    }

    Ok(SigningPair::new(key, cert_pem.to_string()))
}

fn write_file(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    std::fs::write(path, content).map_err(|e| PkiError::persist(path, e))?;
    set_mode(path, mode)
}

fn copy_file(from: &Path, to: &Path, mode: u32) -> Result<()> {
    std::fs::copy(from, to).map_err(|e| PkiError::persist(to, e))?;
    set_mode(to, mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| PkiError::persist(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{CertAuthority, RsaAuthority};
    use crate::profile::CertProfile;

    fn store() -> (tempfile::TempDir, CertStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path());
        store.ensure_dir().unwrap();
        (dir, store)
    }

    #[test]
    fn role_table_uses_fixed_names() {
        let store = CertStore::at(PathBuf::from("/tls"));
        assert_eq!(
            store.paths(CertRole::RootCa).cert,
            PathBuf::from("/tls/root-ca.crt")
        );
        assert_eq!(
            store.paths(CertRole::ClusterApiServer).key,
            PathBuf::from("/tls/cluster-apiserver-ca.key")
        );
        assert_eq!(
            store.paths(CertRole::ServiceAccount).cert,
            PathBuf::from("/tls/service-account.pub")
        );
        assert_eq!(
            store.paths(CertRole::ServiceAccount).key,
            PathBuf::from("/tls/service-account.key")
        );
    }

    #[test]
    fn store_lives_under_generated_tls() {
        let store = CertStore::new(Path::new("/clusters/dev"));
        assert_eq!(store.dir(), Path::new("/clusters/dev/generated/tls"));
    }

    #[test]
    fn combined_file_appends_issuer() {
        let (_dir, store) = store();
        let ca = RsaAuthority.sign(None, &CertProfile::ca("kube-ca")).unwrap();
        let leaf = RsaAuthority
            .sign(Some(&ca), &CertProfile::leaf("apiserver"))
            .unwrap();

        store.write_pair(CertRole::ApiServer, &leaf, Some(&ca)).unwrap();

        let written = String::from_utf8(store.read_cert(CertRole::ApiServer).unwrap()).unwrap();
        assert_eq!(written.matches("BEGIN CERTIFICATE").count(), 2);
        assert!(written.starts_with(leaf.cert_pem()));
        assert!(written.ends_with(ca.cert_pem()));
    }

    #[cfg(unix)]
    #[test]
    fn keys_are_private_and_certs_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = store();
        let ca = RsaAuthority.sign(None, &CertProfile::ca("root-ca")).unwrap();
        store.write_pair(CertRole::RootCa, &ca, None).unwrap();

        let paths = store.paths(CertRole::RootCa);
        let key_mode = std::fs::metadata(&paths.key).unwrap().permissions().mode();
        let cert_mode = std::fs::metadata(&paths.cert).unwrap().permissions().mode();
        assert_eq!(key_mode & 0o777, 0o600);
        assert_eq!(cert_mode & 0o777, 0o644);
    }

    #[test]
    fn alias_copies_certificate_and_optionally_key() {
        let (_dir, store) = store();
        let ca = RsaAuthority.sign(None, &CertProfile::ca("kube-ca")).unwrap();
        store.write_pair(CertRole::KubeCa, &ca, None).unwrap();

        store
            .write_alias(CertRole::KubeCa, CertRole::IngressCa, false)
            .unwrap();

        assert_eq!(
            store.read_cert(CertRole::IngressCa).unwrap(),
            store.read_cert(CertRole::KubeCa).unwrap()
        );
        assert!(!store.paths(CertRole::IngressCa).key.exists());
    }

    #[test]
    fn missing_external_ca_is_a_config_error() {
        let (dir, store) = store();
        let external = ExternalRootCa {
            cert_path: dir.path().join("nope.crt"),
            key_path: dir.path().join("nope.key"),
        };
        let result = store.import_root_ca(&external);
        assert!(matches!(result, Err(PkiError::InvalidExternalCa { .. })));
        assert!(!store.paths(CertRole::RootCa).cert.exists());
    }

    #[test]
    fn garbage_external_ca_rejected_before_persisting() {
        let (dir, store) = store();
        let cert_path = dir.path().join("ca.crt");
        let key_path = dir.path().join("ca.key");
        std::fs::write(&cert_path, "not a certificate").unwrap();
        std::fs::write(&key_path, "not a key").unwrap();

        let result = store.import_root_ca(&ExternalRootCa {
            cert_path: cert_path.clone(),
            key_path,
        });
        match result {
            Err(PkiError::InvalidExternalCa { path, .. }) => assert_eq!(path, cert_path),
            other => panic!("expected InvalidExternalCa, got {:?}", other),
        }
        assert!(!store.paths(CertRole::RootCa).cert.exists());
        assert!(!store.paths(CertRole::RootCa).key.exists());
    }

    #[test]
    fn non_ca_external_certificate_rejected() {
        let (dir, store) = store();
        let root = RsaAuthority.sign(None, &CertProfile::ca("root-ca")).unwrap();
        let leaf = RsaAuthority
            .sign(Some(&root), &CertProfile::leaf("not-a-ca"))
            .unwrap();
        let cert_path = dir.path().join("leaf.crt");
        let key_path = dir.path().join("leaf.key");
        std::fs::write(&cert_path, leaf.cert_pem()).unwrap();
        std::fs::write(&key_path, leaf.key_pem()).unwrap();

        let err = store
            .import_root_ca(&ExternalRootCa {
                cert_path,
                key_path,
            })
            .unwrap_err();
        assert!(err.to_string().contains("not a CA"));
    }

    #[test]
    fn external_ca_with_foreign_key_rejected() {
        let (dir, store) = store();
        let root_a = RsaAuthority.sign(None, &CertProfile::ca("root-a")).unwrap();
        let root_b = RsaAuthority.sign(None, &CertProfile::ca("root-b")).unwrap();
        let cert_path = dir.path().join("ca.crt");
        let key_path = dir.path().join("ca.key");
        std::fs::write(&cert_path, root_a.cert_pem()).unwrap();
        std::fs::write(&key_path, root_b.key_pem()).unwrap();

        let err = store
            .import_root_ca(&ExternalRootCa {
                cert_path,
                key_path: key_path.clone(),
            })
            .unwrap_err();
        match err {
            PkiError::InvalidExternalCa { path, .. } => assert_eq!(path, key_path),
            other => panic!("expected InvalidExternalCa, got {:?}", other),
        }
        assert!(!store.paths(CertRole::RootCa).cert.exists());
        assert!(!store.paths(CertRole::RootCa).key.exists());
    }

    #[test]
    fn matching_external_ca_imported_verbatim() {
        let (dir, store) = store();
        let root = RsaAuthority.sign(None, &CertProfile::ca("root-ca")).unwrap();
        let cert_path = dir.path().join("ca.crt");
        let key_path = dir.path().join("ca.key");
        std::fs::write(&cert_path, root.cert_pem()).unwrap();
        std::fs::write(&key_path, root.key_pem()).unwrap();

        store
            .import_root_ca(&ExternalRootCa {
                cert_path,
                key_path,
            })
            .unwrap();
        assert_eq!(
            store.read_cert(CertRole::RootCa).unwrap(),
            root.cert_pem().as_bytes()
        );
    }
}
