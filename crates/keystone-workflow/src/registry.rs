//! Lifecycle steps and their templates
//!
//! Templates are laid out as `<templates_root>/<step>/<platform>/`. A step
//! that only exists for some platforms simply has no directory for the
//! others.

use std::path::PathBuf;

use crate::config::Platform;
use crate::error::{Result, WorkflowError};

/// Cloud and DNS assets shared by the control plane and workers
pub const ASSETS_STEP: &str = "assets";

/// Control plane and worker infrastructure
pub const INFRA_STEP: &str = "infra";

/// Temporary bootstrap node
pub const BOOTSTRAP_STEP: &str = "bootstrap";

/// A named provisioning step and the extra executor arguments it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleStep {
    /// Step name, also the template directory and state artifact stem
    pub name: String,
    /// Arguments appended to every executor call for this step
    pub extra_args: Vec<String>,
}

impl LifecycleStep {
    /// Step without extra arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra_args: Vec::new(),
        }
    }

    /// Add executor arguments
    pub fn with_args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Resolves steps to per-platform template directories
#[derive(Debug, Clone)]
pub struct StepRegistry {
    templates_root: PathBuf,
}

impl StepRegistry {
    /// Registry over templates under `templates_root`
    pub fn new(templates_root: impl Into<PathBuf>) -> Self {
        Self {
            templates_root: templates_root.into(),
        }
    }

    /// Template directory of `step` for `platform`
    ///
    /// Fails with [`WorkflowError::UnsupportedPlatform`] if the step has no
    /// variant for the platform.
    pub fn template_dir(&self, step: &str, platform: Platform) -> Result<PathBuf> {
        let dir = self.templates_root.join(step).join(platform.as_str());
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(WorkflowError::UnsupportedPlatform {
                step: step.to_string(),
                platform,
                template_dir: dir,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_existing_platform_variant() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("infra/aws")).unwrap();

        let registry = StepRegistry::new(root.path());
        assert_eq!(
            registry.template_dir(INFRA_STEP, Platform::Aws).unwrap(),
            root.path().join("infra/aws")
        );
        assert!(registry.template_dir(INFRA_STEP, Platform::Libvirt).is_err());
    }

    #[test]
    fn missing_variant_is_unsupported() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("infra/aws")).unwrap();

        let err = StepRegistry::new(root.path())
            .template_dir(INFRA_STEP, Platform::Libvirt)
            .unwrap_err();
        match err {
            WorkflowError::UnsupportedPlatform { step, platform, .. } => {
                assert_eq!(step, "infra");
                assert_eq!(platform, Platform::Libvirt);
            }
            other => panic!("expected UnsupportedPlatform, got {:?}", other),
        }
    }

    #[test]
    fn step_args_accumulate() {
        let step = LifecycleStep::new(BOOTSTRAP_STEP)
            .with_args(["-parallelism=1"])
            .with_args(vec!["-lock=false".to_string()]);
        assert_eq!(step.extra_args, vec!["-parallelism=1", "-lock=false"]);
    }
}
