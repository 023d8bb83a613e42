//! Cluster configuration
//!
//! Loaded from `<cluster_dir>/config.yaml`:
//!
//! ```yaml
//! name: demo
//! base_domain: example.com
//! platform: aws
//! networking:
//!   service_cidr: 10.3.0.0/16
//! ca:
//!   root_ca_cert_path: /secure/root-ca.crt
//!   root_ca_key_path: /secure/root-ca.key
//! worker_pool:
//!   namespace: openshift-cluster-api
//!   name: worker
//! drain_policy: best-effort
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use keystone_pki::{ClusterIdentity, ExternalRootCa};

use crate::drain::WorkerPoolRef;
use crate::error::{Result, WorkflowError};

/// Service network used when none is configured
pub const DEFAULT_SERVICE_CIDR: &str = "10.3.0.0/16";

/// Infrastructure platform a cluster runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Amazon Web Services
    Aws,
    /// Local libvirt/KVM
    Libvirt,
}

impl Platform {
    /// Name used for template directories and variables
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Aws => "aws",
            Platform::Libvirt => "libvirt",
        }
    }

    /// How teardown treats worker drain failures on this platform
    ///
    /// Cloud workers keep billing if their MachineSet is left behind, so a
    /// failed drain on AWS stops the teardown. Libvirt workers die with
    /// the host network anyway.
    pub fn default_drain_policy(self) -> DrainPolicy {
        match self {
            Platform::Aws => DrainPolicy::Required,
            Platform::Libvirt => DrainPolicy::BestEffort,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a worker drain failure means for teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrainPolicy {
    /// Drain errors abort the teardown
    Required,
    /// Drain errors are logged and the teardown continues
    BestEffort,
    /// No drain is attempted
    Skip,
}

/// Cluster networking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkingConfig {
    /// Range the in-cluster service addresses are drawn from
    #[serde(default = "default_service_cidr")]
    pub service_cidr: String,
}

impl Default for NetworkingConfig {
    fn default() -> Self {
        Self {
            service_cidr: default_service_cidr(),
        }
    }
}

fn default_service_cidr() -> String {
    DEFAULT_SERVICE_CIDR.to_string()
}

/// Operator-supplied root CA
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaConfig {
    /// PEM certificate of the root CA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_ca_cert_path: Option<PathBuf>,
    /// PEM RSA private key of the root CA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_ca_key_path: Option<PathBuf>,
}

/// Everything a workflow needs to know about the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name, a DNS label
    pub name: String,
    /// Base DNS domain
    pub base_domain: String,
    /// Infrastructure platform
    pub platform: Platform,
    /// Networking settings
    #[serde(default)]
    pub networking: NetworkingConfig,
    /// External root CA, if the hierarchy should not get a fresh root
    #[serde(default)]
    pub ca: CaConfig,
    /// Worker pool drained before infrastructure teardown
    #[serde(default)]
    pub worker_pool: WorkerPoolRef,
    /// Override of the platform's drain policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_policy: Option<DrainPolicy>,
}

impl ClusterConfig {
    /// Parse and validate a configuration document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ClusterConfig = serde_yaml::from_str(yaml)
            .map_err(|e| WorkflowError::config(format!("invalid cluster config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config.yaml` from a cluster directory
    pub fn load(cluster_dir: &Path) -> Result<Self> {
        let path = cluster_dir.join(keystone_common::CLUSTER_CONFIG_FILE);
        let yaml = std::fs::read_to_string(&path).map_err(|e| {
            WorkflowError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&yaml)?;
        debug!(path = %path.display(), cluster = %config.name, "Loaded cluster config");
        Ok(config)
    }

    /// Check the fields serde cannot
    pub fn validate(&self) -> Result<()> {
        if !is_dns_label(&self.name) {
            return Err(WorkflowError::config(format!(
                "cluster name '{}' must be a lowercase DNS label",
                self.name
            )));
        }
        if self.base_domain.trim().is_empty() {
            return Err(WorkflowError::config("base_domain must not be empty"));
        }
        if self.worker_pool.namespace.is_empty() || self.worker_pool.name.is_empty() {
            return Err(WorkflowError::config(
                "worker_pool namespace and name must not be empty",
            ));
        }
        keystone_pki::cidr_host(&self.networking.service_cidr, 1)
            .map_err(|e| WorkflowError::config(e.to_string()))?;

        match (&self.ca.root_ca_cert_path, &self.ca.root_ca_key_path) {
            (Some(_), Some(_)) | (None, None) => Ok(()),
            _ => Err(WorkflowError::config(
                "ca.root_ca_cert_path and ca.root_ca_key_path must be set together",
            )),
        }
    }

    /// Cluster facts that feed the TLS hierarchy
    pub fn identity(&self) -> ClusterIdentity {
        ClusterIdentity {
            name: self.name.clone(),
            base_domain: self.base_domain.clone(),
            service_cidr: self.networking.service_cidr.clone(),
        }
    }

    /// External root CA, with relative paths resolved against `cluster_dir`
    pub fn external_root_ca(&self, cluster_dir: &Path) -> Option<ExternalRootCa> {
        match (&self.ca.root_ca_cert_path, &self.ca.root_ca_key_path) {
            (Some(cert), Some(key)) => Some(ExternalRootCa {
                cert_path: cluster_dir.join(cert),
                key_path: cluster_dir.join(key),
            }),
            _ => None,
        }
    }

    /// Effective drain policy: the override if set, else the platform's
    pub fn drain_policy(&self) -> DrainPolicy {
        self.drain_policy
            .unwrap_or_else(|| self.platform.default_drain_policy())
    }

    /// Variables handed to every terraform invocation
    pub fn terraform_variables(&self, cluster_dir: &Path) -> serde_json::Value {
        serde_json::json!({
            "cluster_name": self.name,
            "base_domain": self.base_domain,
            "platform": self.platform.as_str(),
            "service_cidr": self.networking.service_cidr,
            "tls_dir": keystone_common::tls_dir(cluster_dir),
            "worker_pool_namespace": self.worker_pool.namespace,
            "worker_pool_name": self.worker_pool.name,
        })
    }
}

fn is_dns_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}
