//! Concrete workflow steps and the create/destroy assemblies

mod drain;
mod provision;
mod setup;
mod tls;

pub use drain::DrainWorkers;
pub use provision::{run_apply_step, run_destroy_step, ApplyStep, DestroyStep};
pub use setup::{GenerateVariables, ReadClusterConfig};
pub use tls::GenerateTls;

use crate::engine::{Step, Workflow};
use crate::registry::{LifecycleStep, ASSETS_STEP, BOOTSTRAP_STEP, INFRA_STEP};

/// Bring a cluster up: configuration, TLS, then infrastructure in order
pub fn create_workflow() -> Workflow {
    let steps: Vec<Box<dyn Step>> = vec![
        Box::new(ReadClusterConfig),
        Box::new(GenerateVariables),
        Box::new(GenerateTls),
        Box::new(ApplyStep(LifecycleStep::new(ASSETS_STEP))),
        Box::new(ApplyStep(LifecycleStep::new(INFRA_STEP))),
        Box::new(ApplyStep(LifecycleStep::new(BOOTSTRAP_STEP))),
    ];
    Workflow::new("create", steps)
}

/// Tear a cluster down in reverse, draining workers before their infrastructure
pub fn destroy_workflow() -> Workflow {
    let steps: Vec<Box<dyn Step>> = vec![
        Box::new(ReadClusterConfig),
        Box::new(GenerateVariables),
        Box::new(DestroyStep(LifecycleStep::new(BOOTSTRAP_STEP))),
        Box::new(DrainWorkers::new(INFRA_STEP)),
        Box::new(DestroyStep(LifecycleStep::new(INFRA_STEP))),
        Box::new(DestroyStep(LifecycleStep::new(ASSETS_STEP))),
    ];
    Workflow::new("destroy", steps)
}

/// Generate only the TLS hierarchy
pub fn tls_workflow() -> Workflow {
    let steps: Vec<Box<dyn Step>> = vec![Box::new(ReadClusterConfig), Box::new(GenerateTls)];
    Workflow::new("tls", steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use crate::drain::MockWorkerDrain;
    use crate::engine::WorkflowContext;
    use crate::provisioner::MockProvisioner;
    use crate::registry::StepRegistry;

    #[test]
    fn create_applies_in_dependency_order() {
        assert_eq!(
            create_workflow().step_names(),
            vec![
                "read-config",
                "generate-variables",
                "generate-tls",
                "apply-assets",
                "apply-infra",
                "apply-bootstrap",
            ]
        );
    }

    #[test]
    fn destroy_drains_before_infra() {
        assert_eq!(
            destroy_workflow().step_names(),
            vec![
                "read-config",
                "generate-variables",
                "destroy-bootstrap",
                "drain-workers",
                "destroy-infra",
                "destroy-assets",
            ]
        );
    }

    fn write_cluster(dir: &Path, platform: &str) {
        std::fs::write(
            dir.join("config.yaml"),
            format!(
                "name: demo\nbase_domain: example.com\nplatform: {}\n",
                platform
            ),
        )
        .unwrap();
    }

    fn templates(root: &Path, platform: &str) {
        for step in [ASSETS_STEP, INFRA_STEP, BOOTSTRAP_STEP] {
            std::fs::create_dir_all(root.join(step).join(platform)).unwrap();
        }
    }

    #[tokio::test]
    async fn destroy_runs_steps_in_reverse_with_drain_between() {
        let cluster = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        write_cluster(cluster.path(), "aws");
        templates(root.path(), "aws");
        let state = cluster.path().join("state");
        std::fs::create_dir_all(&state).unwrap();
        for step in [ASSETS_STEP, INFRA_STEP, BOOTSTRAP_STEP] {
            std::fs::write(state.join(format!("{}.tfstate", step)), "{}").unwrap();
        }

        let calls = Arc::new(Mutex::new(Vec::<String>::new()));

        let mut provisioner = MockProvisioner::new();
        let log = calls.clone();
        provisioner
            .expect_destroy()
            .times(3)
            .returning(move |step, _, _| {
                log.lock().unwrap().push(format!("destroy {}", step));
                Ok(())
            });

        let mut drainer = MockWorkerDrain::new();
        let log = calls.clone();
        drainer.expect_drain().times(1).returning(move |_, pool| {
            log.lock().unwrap().push(format!("drain {}", pool));
            Ok(())
        });

        let mut ctx = WorkflowContext::new(
            cluster.path(),
            StepRegistry::new(root.path()),
            Arc::new(provisioner),
            Arc::new(drainer),
        );
        destroy_workflow().run(&mut ctx).await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "destroy bootstrap",
                "drain openshift-cluster-api/worker",
                "destroy infra",
                "destroy assets",
            ]
        );
        assert!(cluster.path().join("terraform.tfvars.json").is_file());
    }

    #[tokio::test]
    async fn destroy_of_never_created_cluster_is_a_no_op() {
        let cluster = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        write_cluster(cluster.path(), "libvirt");

        let mut provisioner = MockProvisioner::new();
        provisioner.expect_destroy().never();
        let mut drainer = MockWorkerDrain::new();
        drainer.expect_drain().never();

        let mut ctx = WorkflowContext::new(
            cluster.path(),
            StepRegistry::new(root.path()),
            Arc::new(provisioner),
            Arc::new(drainer),
        );
        destroy_workflow().run(&mut ctx).await.unwrap();
    }

    #[tokio::test]
    async fn create_generates_tls_and_applies_every_step() {
        let cluster = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        write_cluster(cluster.path(), "libvirt");
        templates(root.path(), "libvirt");

        let applied = Arc::new(Mutex::new(Vec::<String>::new()));
        let log = applied.clone();
        let mut provisioner = MockProvisioner::new();
        provisioner
            .expect_apply()
            .times(3)
            .returning(move |step, _, _| {
                log.lock().unwrap().push(step.to_string());
                Ok(())
            });

        let mut ctx = WorkflowContext::new(
            cluster.path(),
            StepRegistry::new(root.path()),
            Arc::new(provisioner),
            Arc::new(MockWorkerDrain::new()),
        );
        create_workflow().run(&mut ctx).await.unwrap();

        assert_eq!(*applied.lock().unwrap(), vec!["assets", "infra", "bootstrap"]);
        assert!(cluster
            .path()
            .join("generated/tls/service-account.pub")
            .is_file());
    }

    #[tokio::test]
    async fn create_retries_apply_that_failed_after_writing_state() {
        let cluster = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        write_cluster(cluster.path(), "aws");
        templates(root.path(), "aws");

        // terraform writes -state= before it fails partway through
        let state_dir = cluster.path().join("state");
        let mut failing = MockProvisioner::new();
        failing
            .expect_apply()
            .times(1)
            .returning(move |step, _, _| {
                std::fs::write(state_dir.join(format!("{}.tfstate", step)), "{}").unwrap();
                Err(crate::provisioner::ProvisionerError::Failed {
                    command: format!("terraform apply ({})", step),
                    status: Some(1),
                    stderr: "LimitExceeded".to_string(),
                })
            });

        let mut ctx = WorkflowContext::new(
            cluster.path(),
            StepRegistry::new(root.path()),
            Arc::new(failing),
            Arc::new(MockWorkerDrain::new()),
        );
        assert!(create_workflow().run(&mut ctx).await.is_err());
        assert!(cluster.path().join("state/assets.tfstate").is_file());

        let applied = Arc::new(Mutex::new(Vec::<String>::new()));
        let log = applied.clone();
        let mut provisioner = MockProvisioner::new();
        provisioner
            .expect_apply()
            .times(3)
            .returning(move |step, _, _| {
                log.lock().unwrap().push(step.to_string());
                Ok(())
            });

        let mut ctx = WorkflowContext::new(
            cluster.path(),
            StepRegistry::new(root.path()),
            Arc::new(provisioner),
            Arc::new(MockWorkerDrain::new()),
        );
        create_workflow().run(&mut ctx).await.unwrap();

        assert_eq!(*applied.lock().unwrap(), vec!["assets", "infra", "bootstrap"]);
    }

    #[tokio::test]
    async fn create_stops_at_first_failed_apply() {
        let cluster = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        write_cluster(cluster.path(), "aws");
        // infra has no aws variant
        std::fs::create_dir_all(root.path().join("assets/aws")).unwrap();
        std::fs::create_dir_all(root.path().join("bootstrap/aws")).unwrap();

        let mut provisioner = MockProvisioner::new();
        provisioner
            .expect_apply()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut ctx = WorkflowContext::new(
            cluster.path(),
            StepRegistry::new(root.path()),
            Arc::new(provisioner),
            Arc::new(MockWorkerDrain::new()),
        );
        let err = create_workflow().run(&mut ctx).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::WorkflowError::UnsupportedPlatform { ref step, .. } if step == "infra"
        ));
    }
}
