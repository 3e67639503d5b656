//! Docker container backend
//!
//! [`ContainerSandbox`] provisions one disposable container per execution
//! through a [`ContainerRuntime`]. [`DockerCli`] is the production runtime
//! and drives the `docker` command-line client.
//!
//! References for the docker CLI:
//! - https://docs.docker.com/reference/cli/docker/container/create/
//! - https://docs.docker.com/reference/cli/docker/container/start/

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use crate::docker::cli::DockerCli;
pub use crate::docker::command::{DockerAction, DockerCommand};
pub use crate::docker::guard::ContainerGuard;
pub use crate::docker::sandbox::ContainerSandbox;
use crate::config::BackendKind;
use crate::sandbox::{Captured, Unavailable, mark_truncated};
use crate::types::{ExecutionResult, ResourceLimits};

mod cli;
mod command;
mod guard;
mod sandbox;

/// Label set on every container this crate creates
pub const MANAGED_LABEL: &str = "boxrun.managed";

/// Label carrying the id of the sandbox instance that owns a container
pub const INSTANCE_LABEL: &str = "boxrun.instance";

/// Errors from the container runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("executable '{}' not found", .0.display())]
    NotInstalled(PathBuf),

    #[error("{0}")]
    Unreachable(String),

    #[error("container {action} failed: {message}")]
    CommandFailed {
        action: &'static str,
        message: String,
    },

    #[error("failed to spawn {}: {source}", binary.display())]
    SpawnFailed {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Classify a failed availability probe
    pub fn into_unavailable(self, backend: BackendKind) -> Unavailable {
        match self {
            RuntimeError::NotInstalled(binary) => Unavailable::NotInstalled {
                backend,
                program: binary.display().to_string(),
            },
            other => Unavailable::Unreachable {
                backend,
                detail: other.to_string(),
            },
        }
    }
}

/// Identifier returned by the runtime for a created container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything needed to create one execution container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Interpreter command with the code already substituted
    pub command: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub network: String,
    pub user: Option<String>,
    pub read_only: bool,
    pub tmpfs: Vec<String>,
    pub env: Vec<String>,
    pub limits: ResourceLimits,
}

/// Output of a container that ran to completion (or was killed)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: i32,
    pub stdout: Captured,
    pub stderr: Captured,
}

impl RunOutput {
    /// Convert into a completed result, flagging truncated streams
    pub fn into_result(self) -> ExecutionResult {
        let result =
            ExecutionResult::completed(self.exit_code, self.stdout.to_text(), self.stderr.to_text());
        mark_truncated(result, &self.stdout, &self.stderr)
    }
}

/// Narrow interface to a container engine
///
/// Abstracted so the execution state machine can be exercised without a
/// daemon.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + fmt::Debug {
    /// Check that the engine answers
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Create (but do not start) a container
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, RuntimeError>;

    /// Start the container attached, collect its output and exit code
    ///
    /// Each stream keeps at most `max_output` bytes.
    async fn run(&self, id: &ContainerId, max_output: usize) -> Result<RunOutput, RuntimeError>;

    /// Kill a running container
    async fn kill(&self, id: &ContainerId) -> Result<(), RuntimeError>;

    /// Force-remove a container and its anonymous volumes
    async fn remove(&self, id: &ContainerId) -> Result<(), RuntimeError>;

    /// List containers (in any state) carrying `label` (`key` or `key=value`)
    async fn list(&self, label: &str) -> Result<Vec<ContainerId>, RuntimeError>;
}
