//! Infrastructure executor
//!
//! [`Provisioner`] is the opaque "apply or destroy this template directory"
//! capability the lifecycle steps drive. [`TerraformProvisioner`] shells out
//! to `terraform` with the cluster's variables and a per-step state file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

/// Default timeout for a single terraform command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Errors from the infrastructure executor
#[derive(Debug, Error)]
pub enum ProvisionerError {
    /// The executor binary could not be started
    #[error("failed to execute {command}: {source}")]
    Spawn {
        /// Command line being run
        command: String,
        /// Spawn error
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish in time
    #[error("{command} timed out after {timeout:?}")]
    Timeout {
        /// Command line being run
        command: String,
        /// Limit that was exceeded
        timeout: Duration,
    },

    /// The command exited unsuccessfully
    #[error("{command} exited with status {status:?}: {stderr}")]
    Failed {
        /// Command line being run
        command: String,
        /// Exit code, if the process exited normally
        status: Option<i32>,
        /// Captured standard error
        stderr: String,
    },
}

/// Apply or destroy a template directory
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create or update the resources described by `template_dir`
    async fn apply(
        &self,
        step: &str,
        template_dir: &Path,
        extra_args: &[String],
    ) -> Result<(), ProvisionerError>;

    /// Tear down the resources previously applied for `step`
    async fn destroy(
        &self,
        step: &str,
        template_dir: &Path,
        extra_args: &[String],
    ) -> Result<(), ProvisionerError>;
}

/// Terraform action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// `terraform apply`
    Apply,
    /// `terraform destroy`
    Destroy,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Action::Apply => "apply",
            Action::Destroy => "destroy",
        }
    }
}

/// Runs terraform against a cluster directory
#[derive(Debug, Clone)]
pub struct TerraformProvisioner {
    binary: PathBuf,
    state_dir: PathBuf,
    var_file: PathBuf,
    timeout: Duration,
}

impl TerraformProvisioner {
    /// Provisioner for the cluster rooted at `cluster_dir`
    pub fn new(cluster_dir: &Path) -> Self {
        Self {
            binary: PathBuf::from("terraform"),
            state_dir: keystone_common::state_dir(cluster_dir),
            var_file: keystone_common::tfvars_path(cluster_dir),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Use a specific terraform binary
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Override the per-command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments for `terraform init`
    pub fn init_args(&self, template_dir: &Path) -> Vec<OsString> {
        vec![chdir_arg(template_dir), OsString::from("init"), "-input=false".into()]
    }

    /// Arguments for an apply or destroy of `step`
    pub fn action_args(
        &self,
        action: Action,
        step: &str,
        template_dir: &Path,
        extra_args: &[String],
    ) -> Vec<OsString> {
        let state_path = self
            .state_dir
            .join(format!("{}.{}", step, keystone_common::STATE_FILE_EXTENSION));

        let mut args = vec![
            chdir_arg(template_dir),
            OsString::from(action.as_str()),
            "-auto-approve".into(),
            "-input=false".into(),
            flag_arg("-state=", &state_path),
            flag_arg("-var-file=", &self.var_file),
        ];
        args.extend(extra_args.iter().map(OsString::from));
        args
    }

    async fn run(
        &self,
        action: Action,
        step: &str,
        template_dir: &Path,
        extra_args: &[String],
    ) -> Result<(), ProvisionerError> {
        std::fs::create_dir_all(&self.state_dir).map_err(|source| ProvisionerError::Spawn {
            command: format!("mkdir {}", self.state_dir.display()),
            source,
        })?;

        self.run_command(
            self.init_args(template_dir),
            &format!("terraform init ({})", step),
        )
        .await?;
        self.run_command(
            self.action_args(action, step, template_dir, extra_args),
            &format!("terraform {} ({})", action.as_str(), step),
        )
        .await
    }

    async fn run_command(
        &self,
        args: Vec<OsString>,
        description: &str,
    ) -> Result<(), ProvisionerError> {
        info!(command = %description, "Running");
        let mut cmd = Command::new(&self.binary);
        cmd.args(&args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                warn!(command = %description, timeout = ?self.timeout, "Command timed out");
                ProvisionerError::Timeout {
                    command: description.to_string(),
                    timeout: self.timeout,
                }
            })?
            .map_err(|source| ProvisionerError::Spawn {
                command: description.to_string(),
                source,
            })?;

        if output.status.success() {
            info!(command = %description, "Succeeded");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(command = %description, status = ?output.status.code(), "Command failed");
            Err(ProvisionerError::Failed {
                command: description.to_string(),
                status: output.status.code(),
                stderr,
            })
        }
    }
}

#[async_trait]
impl Provisioner for TerraformProvisioner {
    async fn apply(
        &self,
        step: &str,
        template_dir: &Path,
        extra_args: &[String],
    ) -> Result<(), ProvisionerError> {
        self.run(Action::Apply, step, template_dir, extra_args).await
    }

    async fn destroy(
        &self,
        step: &str,
        template_dir: &Path,
        extra_args: &[String],
    ) -> Result<(), ProvisionerError> {
        self.run(Action::Destroy, step, template_dir, extra_args).await
    }
}

fn chdir_arg(dir: &Path) -> OsString {
    flag_arg("-chdir=", dir)
}

fn flag_arg(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(path.as_os_str());
    arg
}
