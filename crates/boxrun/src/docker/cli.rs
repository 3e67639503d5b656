//! [`ContainerRuntime`] backed by the docker command-line client

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::docker::command::{DockerAction, DockerCommand};
use crate::docker::{ContainerId, ContainerRuntime, ContainerSpec, RunOutput, RuntimeError};
use crate::sandbox::read_capped;

/// Drives the `docker` binary
#[derive(Debug, Clone)]
pub struct DockerCli {
    docker_path: PathBuf,
}

impl DockerCli {
    pub fn new(docker_path: impl Into<PathBuf>) -> Self {
        Self {
            docker_path: docker_path.into(),
        }
    }

    /// Get the path to the docker binary
    pub fn docker_path(&self) -> &Path {
        &self.docker_path
    }

    fn command(&self, action: DockerAction) -> DockerCommand {
        DockerCommand::new(&self.docker_path, action)
    }

    fn spawn_error(&self, err: std::io::Error) -> RuntimeError {
        if err.kind() == std::io::ErrorKind::NotFound {
            RuntimeError::NotInstalled(self.docker_path.clone())
        } else {
            RuntimeError::SpawnFailed {
                binary: self.docker_path.clone(),
                source: err,
            }
        }
    }

    /// Run a short-lived docker command to completion
    async fn output(&self, cmd: DockerCommand) -> Result<Output, RuntimeError> {
        let args = cmd.build();
        debug!(?args, "running docker");

        let program = args.first().ok_or_else(|| RuntimeError::CommandFailed {
            action: "exec",
            message: "empty command arguments".to_string(),
        })?;
        Command::new(program)
            .args(&args[1..])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))
    }

    /// Run a docker command and fail on a non-zero exit status
    async fn checked(&self, cmd: DockerCommand) -> Result<Output, RuntimeError> {
        let action = cmd.action().as_str();
        let output = self.output(cmd).await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                action,
                message: failure_message(&output),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<(), RuntimeError> {
        let output = self.output(self.command(DockerAction::Version)).await?;
        if !output.status.success() {
            return Err(RuntimeError::Unreachable(failure_message(&output)));
        }
        let version = String::from_utf8_lossy(&output.stdout);
        debug!(server_version = %version.trim(), "docker daemon reachable");
        Ok(())
    }

    #[instrument(skip(self, spec), fields(name = %spec.name, image = %spec.image))]
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, RuntimeError> {
        let output = self
            .checked(self.command(DockerAction::Create).spec(spec))
            .await?;

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(RuntimeError::CommandFailed {
                action: "create",
                message: "no container id returned".to_string(),
            });
        }
        debug!(%id, "container created");
        Ok(ContainerId::new(id))
    }

    #[instrument(skip(self), fields(container = %id))]
    async fn run(&self, id: &ContainerId, max_output: usize) -> Result<RunOutput, RuntimeError> {
        let args = self.command(DockerAction::Start).container(id).build();
        debug!(?args, "starting container");

        let program = args.first().ok_or_else(|| RuntimeError::CommandFailed {
            action: "start",
            message: "empty command arguments".to_string(),
        })?;
        let mut child = Command::new(program)
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

        let (stdout, stderr, status) = tokio::join!(
            read_capped(stdout, max_output),
            read_capped(stderr, max_output),
            child.wait(),
        );
        let (stdout, stderr, status) = (stdout?, stderr?, status?);
        debug!(?status, "attached start finished");

        // The attached client mirrors the exit code only when it started the
        // container cleanly; `docker wait` is authoritative.
        let output = self
            .checked(self.command(DockerAction::Wait).container(id))
            .await?;
        let text = String::from_utf8_lossy(&output.stdout);
        let exit_code = text.trim().parse::<i32>().map_err(|_| RuntimeError::CommandFailed {
            action: "wait",
            message: format!("unexpected exit code output '{}'", text.trim()),
        })?;

        Ok(RunOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    #[instrument(skip(self), fields(container = %id))]
    async fn kill(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.checked(self.command(DockerAction::Kill).container(id))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(container = %id))]
    async fn remove(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.checked(self.command(DockerAction::Remove).container(id))
            .await?;
        debug!("container removed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, label: &str) -> Result<Vec<ContainerId>, RuntimeError> {
        let output = self
            .checked(self.command(DockerAction::List).label(label))
            .await?;
        let ids = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ContainerId::new)
            .collect();
        Ok(ids)
    }
}

/// Best description of why a docker command failed
fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("docker exited with {}", output.status)
    } else {
        stderr.to_string()
    }
}
