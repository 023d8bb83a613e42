//! Common types for Keystone: errors, cluster directory layout, and kube helpers

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;

use std::path::{Path, PathBuf};

pub use error::Error;

/// Cluster configuration file, relative to the cluster directory
pub const CLUSTER_CONFIG_FILE: &str = "config.yaml";

/// Terraform variables file written for every provisioning step
pub const TFVARS_FILE: &str = "terraform.tfvars.json";

/// Directory holding all generated artifacts
pub const GENERATED_DIR: &str = "generated";

/// Directory holding provisioning state artifacts (one per lifecycle step)
pub const STATE_DIR: &str = "state";

/// Extension of a provisioning state artifact
pub const STATE_FILE_EXTENSION: &str = "tfstate";

/// Directory under the cluster directory that holds the TLS hierarchy
pub fn tls_dir(cluster_dir: &Path) -> PathBuf {
    cluster_dir.join(GENERATED_DIR).join("tls")
}

/// Admin kubeconfig written for the cluster once the control plane is up
pub fn kubeconfig_path(cluster_dir: &Path) -> PathBuf {
    cluster_dir.join(GENERATED_DIR).join("auth").join("kubeconfig")
}

/// Directory holding provisioning state artifacts
pub fn state_dir(cluster_dir: &Path) -> PathBuf {
    cluster_dir.join(STATE_DIR)
}

/// Path of the terraform variables file for a cluster
pub fn tfvars_path(cluster_dir: &Path) -> PathBuf {
    cluster_dir.join(TFVARS_FILE)
}
