//! Worker pool drain
//!
//! Before a worker pool's backing infrastructure is destroyed, the pool is
//! scaled to zero through the cluster API and deleted once no machines
//! remain. The pool is a cluster-api `MachineSet`, which has no scale
//! subresource, so the desired count is set with a merge patch on
//! `spec.replicas` and the observed count is read from `status.replicas`.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::core::DynamicObject;
use kube::discovery::ApiResource;
use kube::Client;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use keystone_common::{kube_utils, Error};

/// API version of the worker pool resource
pub const MACHINE_SET_API_VERSION: &str = "cluster.k8s.io/v1alpha1";

/// Kind of the worker pool resource
pub const MACHINE_SET_KIND: &str = "MachineSet";

/// Namespace of the default worker pool
pub const DEFAULT_WORKER_POOL_NAMESPACE: &str = "openshift-cluster-api";

/// Name of the default worker pool
pub const DEFAULT_WORKER_POOL_NAME: &str = "worker";

/// A scalable worker pool in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolRef {
    /// Namespace holding the pool
    pub namespace: String,
    /// Pool name
    pub name: String,
}

impl Default for WorkerPoolRef {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_WORKER_POOL_NAMESPACE.to_string(),
            name: DEFAULT_WORKER_POOL_NAME.to_string(),
        }
    }
}

impl fmt::Display for WorkerPoolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Poll timing for a drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainConfig {
    /// Delay between observations of the replica count
    pub poll_interval: Duration,
    /// Upper bound on the wait for the pool to empty
    pub timeout: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Drain failures
#[derive(Debug, Error)]
pub enum DrainError {
    /// No usable client could be built from the credential file
    #[error("failed to build cluster client: {source}")]
    Client {
        /// Underlying error
        #[source]
        source: Error,
    },

    /// Setting the desired replica count failed
    #[error("failed to scale {pool} to zero: {source}")]
    Patch {
        /// Pool being drained
        pool: String,
        /// Underlying error
        #[source]
        source: Error,
    },

    /// Reading the observed replica count failed
    #[error("failed to read replicas of {pool}: {source}")]
    Poll {
        /// Pool being drained
        pool: String,
        /// Underlying error
        #[source]
        source: Error,
    },

    /// The pool did not reach zero replicas in time
    #[error("timed out after {timeout:?} waiting for {pool} to drain")]
    Timeout {
        /// Pool being drained
        pool: String,
        /// Limit that was exceeded
        timeout: Duration,
    },

    /// Deleting the drained pool failed
    #[error("failed to delete {pool}: {source}")]
    Delete {
        /// Pool being deleted
        pool: String,
        /// Underlying error
        #[source]
        source: Error,
    },
}

/// Narrow control-plane capability over a scalable resource
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkerPoolClient: Send + Sync {
    /// Set the desired replica count
    async fn patch_replicas(&self, namespace: &str, name: &str, replicas: i64)
        -> Result<(), Error>;

    /// Read the observed replica count
    async fn get_replicas(&self, namespace: &str, name: &str) -> Result<i64, Error>;

    /// Delete the resource
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// [`WorkerPoolClient`] over cluster-api MachineSets
pub struct MachineSetClient {
    client: Client,
    resource: ApiResource,
}

impl MachineSetClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resource: kube_utils::build_api_resource(MACHINE_SET_API_VERSION, MACHINE_SET_KIND),
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

#[async_trait]
impl WorkerPoolClient for MachineSetClient {
    async fn patch_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: i64,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({"spec": {"replicas": replicas}});
        self.api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_replicas(&self, namespace: &str, name: &str) -> Result<i64, Error> {
        let machine_set = self.api(namespace).get(name).await?;
        observed_replicas(&machine_set)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        match self
            .api(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = Error::from(e);
                if err.is_not_found() {
                    debug!(namespace, name, "MachineSet already gone");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}

/// Observed replicas of a MachineSet
///
/// The controller omits `status.replicas` when it is zero. A value that is
/// present but not an integer is an error, never zero.
fn observed_replicas(machine_set: &DynamicObject) -> Result<i64, Error> {
    let replicas = match machine_set
        .data
        .get("status")
        .and_then(|status| status.get("replicas"))
    {
        None | Some(serde_json::Value::Null) => return Ok(0),
        Some(replicas) => replicas,
    };
    replicas.as_i64().ok_or_else(|| {
        Error::internal_with_context(
            "observed_replicas",
            format!("status.replicas is not an integer: {}", replicas),
        )
    })
}

/// Scales a worker pool to zero and removes it
pub struct ClusterDrainer<C> {
    client: C,
    config: DrainConfig,
}

impl<C: WorkerPoolClient> ClusterDrainer<C> {
    /// Create a drainer over `client`
    pub fn new(client: C, config: DrainConfig) -> Self {
        Self { client, config }
    }

    /// Patch to zero, wait for the pool to empty, then delete it
    ///
    /// The first observation is made immediately after the patch. Nothing is
    /// deleted unless the observed count reached zero.
    pub async fn drain(&self, pool: &WorkerPoolRef) -> Result<(), DrainError> {
        let pool_name = pool.to_string();

        self.client
            .patch_replicas(&pool.namespace, &pool.name, 0)
            .await
            .map_err(|source| DrainError::Patch {
                pool: pool_name.clone(),
                source,
            })?;
        info!(pool = %pool_name, "Scaled worker pool to zero");

        tokio::time::timeout(self.config.timeout, self.wait_for_zero(pool))
            .await
            .map_err(|_| DrainError::Timeout {
                pool: pool_name.clone(),
                timeout: self.config.timeout,
            })??;

        self.client
            .delete(&pool.namespace, &pool.name)
            .await
            .map_err(|source| DrainError::Delete {
                pool: pool_name.clone(),
                source,
            })?;
        info!(pool = %pool_name, "Worker pool drained and deleted");
        Ok(())
    }

    async fn wait_for_zero(&self, pool: &WorkerPoolRef) -> Result<(), DrainError> {
        loop {
            let observed = self
                .client
                .get_replicas(&pool.namespace, &pool.name)
                .await
                .map_err(|source| DrainError::Poll {
                    pool: pool.to_string(),
                    source,
                })?;

            if observed == 0 {
                return Ok(());
            }
            debug!(pool = %pool, observed, "Waiting for worker pool to drain");
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

/// Build a client from `kubeconfig` and drain `pool`
pub async fn drain_worker_pool(
    kubeconfig: &Path,
    pool: &WorkerPoolRef,
    config: DrainConfig,
) -> Result<(), DrainError> {
    let client = kube_utils::create_client(kubeconfig)
        .await
        .map_err(|source| DrainError::Client { source })?;
    ClusterDrainer::new(MachineSetClient::new(client), config)
        .drain(pool)
        .await
}

/// Drain capability used by the teardown workflow
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkerDrain: Send + Sync {
    /// Drain `pool` in the cluster reachable through `kubeconfig`
    async fn drain(&self, kubeconfig: &Path, pool: &WorkerPoolRef) -> Result<(), DrainError>;
}

/// [`WorkerDrain`] against a live cluster
#[derive(Debug, Clone, Default)]
pub struct KubeWorkerDrain {
    config: DrainConfig,
}

impl KubeWorkerDrain {
    /// Drain with the given poll timing
    pub fn new(config: DrainConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WorkerDrain for KubeWorkerDrain {
    async fn drain(&self, kubeconfig: &Path, pool: &WorkerPoolRef) -> Result<(), DrainError> {
        drain_worker_pool(kubeconfig, pool, self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast() -> DrainConfig {
        DrainConfig {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(200),
        }
    }

    fn pool() -> WorkerPoolRef {
        WorkerPoolRef::default()
    }

    #[test]
    fn default_timing_is_three_seconds_for_a_minute() {
        let config = DrainConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn default_pool_is_cluster_api_worker() {
        assert_eq!(pool().to_string(), "openshift-cluster-api/worker");
    }

    #[test]
    fn observed_replicas_reads_status() {
        let mut obj = DynamicObject::new(
            "worker",
            &kube_utils::build_api_resource(MACHINE_SET_API_VERSION, MACHINE_SET_KIND),
        );
        obj.data = serde_json::json!({"spec": {"replicas": 0}, "status": {"replicas": 2}});
        assert_eq!(observed_replicas(&obj).unwrap(), 2);

        obj.data = serde_json::json!({"spec": {"replicas": 0}, "status": {}});
        assert_eq!(observed_replicas(&obj).unwrap(), 0);

        obj.data = serde_json::json!({"spec": {"replicas": 0}});
        assert_eq!(observed_replicas(&obj).unwrap(), 0);
    }

    #[test]
    fn malformed_status_replicas_is_not_zero() {
        let mut obj = DynamicObject::new(
            "worker",
            &kube_utils::build_api_resource(MACHINE_SET_API_VERSION, MACHINE_SET_KIND),
        );
        obj.data = serde_json::json!({"spec": {"replicas": 0}, "status": {"replicas": "2"}});
        let err = observed_replicas(&obj).unwrap_err();
        assert!(err.to_string().contains("not an integer"));

        obj.data = serde_json::json!({"status": {"replicas": 1.5}});
        assert!(observed_replicas(&obj).is_err());
    }

    #[tokio::test]
    async fn drain_waits_for_zero_then_deletes() {
        let mut client = MockWorkerPoolClient::new();
        let mut seq = Sequence::new();

        client
            .expect_patch_replicas()
            .with(eq("openshift-cluster-api"), eq("worker"), eq(0i64))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let observations = Arc::new(AtomicUsize::new(0));
        let counter = observations.clone();
        client
            .expect_get_replicas()
            .times(4)
            .in_sequence(&mut seq)
            .returning(move |_, _| {
                let remaining = [5, 3, 1, 0];
                Ok(remaining[counter.fetch_add(1, Ordering::SeqCst)])
            });

        client
            .expect_delete()
            .with(eq("openshift-cluster-api"), eq("worker"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        ClusterDrainer::new(client, fast())
            .drain(&pool())
            .await
            .expect("drain should succeed");
        assert_eq!(observations.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn already_empty_pool_is_deleted_without_waiting() {
        let mut client = MockWorkerPoolClient::new();
        client.expect_patch_replicas().returning(|_, _, _| Ok(()));
        client.expect_get_replicas().times(1).returning(|_, _| Ok(0));
        client.expect_delete().times(1).returning(|_, _| Ok(()));

        let config = DrainConfig {
            poll_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
        };
        ClusterDrainer::new(client, config)
            .drain(&pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pool_that_never_empties_times_out_without_delete() {
        let mut client = MockWorkerPoolClient::new();
        client.expect_patch_replicas().returning(|_, _, _| Ok(()));
        client.expect_get_replicas().returning(|_, _| Ok(2));
        client.expect_delete().never();

        let err = ClusterDrainer::new(client, fast())
            .drain(&pool())
            .await
            .unwrap_err();
        match err {
            DrainError::Timeout { pool, timeout } => {
                assert_eq!(pool, "openshift-cluster-api/worker");
                assert_eq!(timeout, Duration::from_millis(200));
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn poll_error_is_fatal_and_distinct_from_timeout() {
        let mut client = MockWorkerPoolClient::new();
        client.expect_patch_replicas().returning(|_, _, _| Ok(()));
        client
            .expect_get_replicas()
            .times(1)
            .returning(|_, _| Err(Error::internal("connection refused")));
        client.expect_delete().never();

        let err = ClusterDrainer::new(client, fast())
            .drain(&pool())
            .await
            .unwrap_err();
        assert!(matches!(err, DrainError::Poll { .. }));
        assert!(err.to_string().contains("openshift-cluster-api/worker"));
    }

    #[tokio::test]
    async fn patch_error_stops_before_polling() {
        let mut client = MockWorkerPoolClient::new();
        client
            .expect_patch_replicas()
            .returning(|_, _, _| Err(Error::internal("forbidden")));
        client.expect_get_replicas().never();
        client.expect_delete().never();

        let err = ClusterDrainer::new(client, fast())
            .drain(&pool())
            .await
            .unwrap_err();
        assert!(matches!(err, DrainError::Patch { .. }));
    }

    #[tokio::test]
    async fn unreadable_kubeconfig_is_a_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = drain_worker_pool(&dir.path().join("missing"), &pool(), fast())
            .await
            .unwrap_err();
        assert!(matches!(err, DrainError::Client { .. }));
    }

    #[tokio::test]
    async fn malformed_kubeconfig_is_a_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubeconfig");
        std::fs::write(&path, "{{{ not yaml").unwrap();

        let err = KubeWorkerDrain::new(fast())
            .drain(&path, &pool())
            .await
            .unwrap_err();
        assert!(matches!(err, DrainError::Client { .. }));
    }
}
