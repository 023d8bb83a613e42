//! Kubernetes client helpers using kube-rs
//!
//! Keystone talks to the cluster it is tearing down through untyped
//! `DynamicObject` APIs, so nothing here depends on generated CRD types.

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use tracing::debug;

use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from a kubeconfig file with default timeouts
///
/// An unreadable or malformed kubeconfig is reported as [`Error::Kubeconfig`]
/// so callers can treat it as a configuration problem rather than a
/// transient API failure.
pub async fn create_client(kubeconfig: &Path) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from a kubeconfig file with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: &Path,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let path = kubeconfig.display().to_string();
    debug!(kubeconfig = %path, "Building kube client");

    let raw = Kubeconfig::read_from(kubeconfig)
        .map_err(|e| Error::kubeconfig(&path, format!("failed to read kubeconfig: {}", e)))?;
    let mut config = Config::from_custom_kubeconfig(raw, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::kubeconfig(&path, format!("failed to load kubeconfig: {}", e)))?;
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);

    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Build an ApiResource from an apiVersion and kind
///
/// The version is used exactly as given; no discovery round-trip is made.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Parse apiVersion into (group, version)
///
/// # Examples
/// ```
/// use keystone_common::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("cluster.k8s.io/v1alpha1");
/// assert_eq!(group, "cluster.k8s.io");
/// assert_eq!(version, "v1alpha1");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind using the simple English rules the
/// API server applies to CRDs
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_set_resource_is_built_from_api_version() {
        let ar = build_api_resource("cluster.k8s.io/v1alpha1", "MachineSet");
        assert_eq!(ar.group, "cluster.k8s.io");
        assert_eq!(ar.version, "v1alpha1");
        assert_eq!(ar.kind, "MachineSet");
        assert_eq!(ar.plural, "machinesets");
    }

    #[test]
    fn pluralize_handles_common_suffixes() {
        assert_eq!(pluralize_kind("Policy"), "policies");
        assert_eq!(pluralize_kind("Gateway"), "gateways");
        assert_eq!(pluralize_kind("Ingress"), "ingresses");
        assert_eq!(pluralize_kind("Machine"), "machines");
    }

    #[tokio::test]
    async fn missing_kubeconfig_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = create_client(&dir.path().join("does-not-exist")).await;
        assert!(matches!(result, Err(Error::Kubeconfig { .. })));
    }

    #[tokio::test]
    async fn malformed_kubeconfig_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubeconfig");
        std::fs::write(&path, "clusters: [this is: not valid").unwrap();

        let result = create_client(&path).await;
        match result {
            Err(Error::Kubeconfig { path: p, .. }) => assert!(p.ends_with("kubeconfig")),
            other => panic!("expected Kubeconfig error, got {:?}", other.map(|_| ())),
        }
    }
}
