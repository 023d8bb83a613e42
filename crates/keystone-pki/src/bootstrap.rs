//! Trust hierarchy bootstrap
//!
//! Builds the full cluster PKI under the cluster directory in a fixed order:
//! root CA, then the service CAs, then the leaves each of them signs, then the
//! service account keypair. Each pair is written before the next step runs
//! and dependants take their issuer from memory, never from disk.
//!
//! Any failure aborts the run with [`PkiError::Mint`] naming the identity.
//! A partially written directory is never valid; callers discard it and
//! start over.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rcgen::{ExtendedKeyUsagePurpose, KeyUsagePurpose};
use tracing::info;

use crate::authority::{CertAuthority, SigningPair};
use crate::error::{PkiError, Result};
use crate::profile::{CertProfile, VALIDITY_THIRTY_MINUTES};
use crate::store::{CertRole, CertStore, ExternalRootCa};

/// Namespace the cluster API aggregated server runs in
pub const CLUSTER_API_NAMESPACE: &str = "openshift-cluster-api";

/// Cluster facts that feed certificate subjects and SANs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIdentity {
    /// Cluster name, used as a DNS label
    pub name: String,
    /// Base DNS domain
    pub base_domain: String,
    /// Service network range, e.g. `10.3.0.0/16`
    pub service_cidr: String,
}

impl ClusterIdentity {
    /// `<name>.<base_domain>`, the ingress base address
    pub fn base_address(&self) -> String {
        format!("{}.{}", self.name, self.base_domain)
    }

    /// `<name>-api.<base_domain>`, the external API DNS name
    pub fn api_address(&self) -> String {
        format!("{}-api.{}", self.name, self.base_domain)
    }

    /// `<name>-tnc.<base_domain>`, the node controller DNS name
    pub fn tnc_address(&self) -> String {
        format!("{}-tnc.{}", self.name, self.base_domain)
    }
}

/// Orchestrates a [`CertAuthority`] and a [`CertStore`] to mint the hierarchy
pub struct PkiBootstrap<'a, A: CertAuthority> {
    authority: &'a A,
    store: &'a CertStore,
    cluster: &'a ClusterIdentity,
}

impl<'a, A: CertAuthority> PkiBootstrap<'a, A> {
    /// Create a bootstrap over the given authority, store and cluster
    pub fn new(authority: &'a A, store: &'a CertStore, cluster: &'a ClusterIdentity) -> Self {
        Self {
            authority,
            store,
            cluster,
        }
    }

    /// Build the whole hierarchy
    ///
    /// With `external_root`, the supplied root CA is validated and copied in
    /// and no root material is generated.
    pub fn run(&self, external_root: Option<&ExternalRootCa>) -> Result<()> {
        self.store.ensure_dir()?;

        let api_host = cidr_host(&self.cluster.service_cidr, 1)?;

        let root = match external_root {
            Some(external) => self
                .store
                .import_root_ca(external)
                .map_err(|e| PkiError::mint(CertRole::RootCa.name(), e))?,
            None => self.mint(
                CertRole::RootCa,
                None,
                &CertProfile::ca("root-ca").organizational_unit("openshift"),
                false,
            )?,
        };

        let kube_ca = self.mint(
            CertRole::KubeCa,
            Some(&root),
            &CertProfile::ca("kube-ca").organizational_unit("bootkube"),
            false,
        )?;

        let etcd_ca = self.mint(
            CertRole::EtcdCa,
            Some(&root),
            &CertProfile::ca("etcd").organizational_unit("etcd"),
            false,
        )?;
        self.alias(CertRole::EtcdCa, CertRole::EtcdClientCa, true)?;

        self.mint(
            CertRole::EtcdClient,
            Some(&etcd_ca),
            &CertProfile::leaf("etcd")
                .organizational_unit("etcd")
                .key_usages([KeyUsagePurpose::KeyEncipherment])
                .ext_key_usages([ExtendedKeyUsagePurpose::ClientAuth]),
            false,
        )?;

        let aggregator_ca = self.mint(
            CertRole::AggregatorCa,
            Some(&root),
            &CertProfile::ca("aggregator").organizational_unit("bootkube"),
            false,
        )?;

        self.mint(
            CertRole::ServiceServingCa,
            Some(&root),
            &CertProfile::ca("service-serving").organizational_unit("bootkube"),
            false,
        )?;

        self.alias(CertRole::KubeCa, CertRole::IngressCa, false)?;
        let base = self.cluster.base_address();
        self.mint(
            CertRole::Ingress,
            Some(&kube_ca),
            &CertProfile::leaf(base.clone())
                .organization("ingress")
                .ext_key_usages(server_and_client())
                .dns_names([base.clone(), format!("*.{}", base)]),
            true,
        )?;

        self.mint(
            CertRole::Admin,
            Some(&kube_ca),
            &CertProfile::leaf("system:admin")
                .organization("system:masters")
                .ext_key_usages(server_and_client()),
            false,
        )?;

        self.mint(
            CertRole::ApiServer,
            Some(&kube_ca),
            &CertProfile::leaf("kube-apiserver")
                .organization("kube-master")
                .ext_key_usages(server_and_client())
                .dns_names([
                    self.cluster.api_address(),
                    "kubernetes".to_string(),
                    "kubernetes.default".to_string(),
                    "kubernetes.default.svc".to_string(),
                    "kubernetes.default.svc.cluster.local".to_string(),
                ])
                .ip_addresses([api_host]),
            true,
        )?;

        self.mint(
            CertRole::OpenshiftApiServer,
            Some(&aggregator_ca),
            &CertProfile::leaf("openshift-apiserver")
                .organization("kube-master")
                .ext_key_usages(server_and_client())
                .dns_names([
                    self.cluster.api_address(),
                    "openshift-apiserver".to_string(),
                    "openshift-apiserver.kube-system".to_string(),
                    "openshift-apiserver.kube-system.svc".to_string(),
                    "openshift-apiserver.kube-system.svc.cluster.local".to_string(),
                    "localhost".to_string(),
                ])
                .ip_addresses([api_host, IpAddr::V4(Ipv4Addr::LOCALHOST)]),
            true,
        )?;

        self.mint(
            CertRole::ApiServerProxy,
            Some(&aggregator_ca),
            &CertProfile::leaf("kube-apiserver-proxy")
                .organization("kube-master")
                .ext_key_usages([ExtendedKeyUsagePurpose::ClientAuth]),
            false,
        )?;

        self.mint(
            CertRole::Kubelet,
            Some(&kube_ca),
            &CertProfile::leaf("system:serviceaccount:kube-system:default")
                .organization("system:serviceaccounts:kube-system")
                .ext_key_usages([ExtendedKeyUsagePurpose::ClientAuth])
                .validity(VALIDITY_THIRTY_MINUTES),
            false,
        )?;

        let tnc = self.cluster.tnc_address();
        self.mint(
            CertRole::Tnc,
            Some(&root),
            &CertProfile::leaf(tnc.clone())
                .key_usages([])
                .ext_key_usages([ExtendedKeyUsagePurpose::ServerAuth])
                .dns_names([tnc]),
            false,
        )?;

        self.mint(
            CertRole::ClusterApiServer,
            Some(&aggregator_ca),
            &CertProfile::leaf("clusterapi")
                .organizational_unit("bootkube")
                .ext_key_usages(server_and_client())
                .dns_names([
                    "clusterapi".to_string(),
                    format!("clusterapi.{}", CLUSTER_API_NAMESPACE),
                    format!("clusterapi.{}.svc", CLUSTER_API_NAMESPACE),
                    format!("clusterapi.{}.svc.cluster.local", CLUSTER_API_NAMESPACE),
                ]),
            true,
        )?;

        let service_account = CertRole::ServiceAccount;
        let key = self
            .authority
            .generate_key()
            .map_err(|e| PkiError::mint(service_account.name(), e))?;
        self.store
            .write_key_pair(service_account, &key)
            .map_err(|e| PkiError::mint(service_account.name(), e))?;

        info!(
            cluster = %self.cluster.name,
            dir = %self.store.dir().display(),
            external_root = external_root.is_some(),
            "TLS hierarchy generated"
        );
        Ok(())
    }

    /// Mint one identity and persist it before returning
    fn mint(
        &self,
        role: CertRole,
        issuer: Option<&SigningPair>,
        profile: &CertProfile,
        embed_issuer: bool,
    ) -> Result<SigningPair> {
        let pair = self
            .authority
            .sign(issuer, profile)
            .map_err(|e| PkiError::mint(role.name(), e))?;

        let embedded = if embed_issuer { issuer } else { None };
        self.store
            .write_pair(role, &pair, embedded)
            .map_err(|e| PkiError::mint(role.name(), e))?;

        info!(identity = %role, common_name = %profile.common_name, "Generated certificate");
        Ok(pair)
    }

    fn alias(&self, source: CertRole, alias: CertRole, with_key: bool) -> Result<()> {
        self.store
            .write_alias(source, alias, with_key)
            .map_err(|e| PkiError::mint(alias.name(), e))
    }
}

fn server_and_client() -> [ExtendedKeyUsagePurpose; 2] {
    [
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ]
}

/// The `host`-th address inside `cidr`
///
/// `cidr_host("10.3.0.0/16", 1)` is `10.3.0.1`, the conventional address of
/// the in-cluster API service. Host bits set in the address part are ignored.
pub fn cidr_host(cidr: &str, host: u32) -> Result<IpAddr> {
    let invalid = |reason: &str| PkiError::InvalidServiceCidr {
        cidr: cidr.to_string(),
        reason: reason.to_string(),
    };

    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| invalid("missing prefix length"))?;
    let addr: IpAddr = addr
        .trim()
        .parse()
        .map_err(|_| invalid("invalid network address"))?;
    let prefix: u32 = prefix
        .trim()
        .parse()
        .map_err(|_| invalid("invalid prefix length"))?;

    match addr {
        IpAddr::V4(v4) => {
            if prefix > 32 {
                return Err(invalid("prefix length exceeds 32"));
            }
            let host_bits = 32 - prefix;
            if host_bits < 32 && u64::from(host) >= 1u64 << host_bits {
                return Err(invalid("host number does not fit in the range"));
            }
            let mask = u32::MAX.checked_shl(host_bits).unwrap_or(0);
            let network = u32::from(v4) & mask;
            Ok(IpAddr::V4(Ipv4Addr::from(network | host)))
        }
        IpAddr::V6(v6) => {
            if prefix > 128 {
                return Err(invalid("prefix length exceeds 128"));
            }
            let host_bits = 128 - prefix;
            if host_bits < 32 && host >= 1u32 << host_bits {
                return Err(invalid("host number does not fit in the range"));
            }
            let mask = u128::MAX.checked_shl(host_bits).unwrap_or(0);
            let network = u128::from(v6) & mask;
            Ok(IpAddr::V6(Ipv6Addr::from(network | u128::from(host))))
        }
    }
}
