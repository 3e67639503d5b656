//! Command builder for the docker CLI
//!
//! Builds command-line arguments for the container lifecycle calls.

use std::path::PathBuf;

use crate::docker::{ContainerId, ContainerSpec};

/// Builder for docker command-line arguments
#[derive(Debug)]
pub struct DockerCommand {
    /// Path to docker binary
    docker_path: PathBuf,
    action: DockerAction,
    /// Target of start/wait/kill/rm
    container: Option<ContainerId>,
    /// Definition used by create
    spec: Option<ContainerSpec>,
    /// `--filter label=...` for ps
    label: Option<String>,
}

impl DockerCommand {
    /// Create a new docker command builder
    pub fn new(docker_path: impl Into<PathBuf>, action: DockerAction) -> Self {
        Self {
            docker_path: docker_path.into(),
            action,
            container: None,
            spec: None,
            label: None,
        }
    }

    /// Set the container to operate on
    pub fn container(mut self, id: &ContainerId) -> Self {
        self.container = Some(id.clone());
        self
    }

    /// Set the container definition for `create`
    pub fn spec(mut self, spec: &ContainerSpec) -> Self {
        self.spec = Some(spec.clone());
        self
    }

    /// Set the label filter for `ps`
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Build the command-line arguments
    ///
    /// The first element is the docker binary.
    pub fn build(self) -> Vec<String> {
        let mut args = vec![self.docker_path.to_string_lossy().into_owned()];

        match self.action {
            DockerAction::Version => {
                args.push("version".to_string());
                args.push("--format".to_string());
                args.push("{{.Server.Version}}".to_string());
            }
            DockerAction::Create => {
                args.push("create".to_string());
                if let Some(spec) = self.spec {
                    push_create_options(&mut args, spec);
                }
            }
            DockerAction::Start => {
                args.push("start".to_string());
                args.push("--attach".to_string());
                args.extend(self.container.map(|id| id.0));
            }
            DockerAction::Wait => {
                args.push("wait".to_string());
                args.extend(self.container.map(|id| id.0));
            }
            DockerAction::Kill => {
                args.push("kill".to_string());
                args.extend(self.container.map(|id| id.0));
            }
            DockerAction::Remove => {
                args.push("rm".to_string());
                args.push("--force".to_string());
                args.push("--volumes".to_string());
                args.extend(self.container.map(|id| id.0));
            }
            DockerAction::List => {
                args.push("ps".to_string());
                args.push("--all".to_string());
                args.push("--quiet".to_string());
                args.push("--no-trunc".to_string());
                if let Some(label) = self.label {
                    args.push("--filter".to_string());
                    args.push(format!("label={label}"));
                }
            }
        }

        args
    }

    pub fn action(&self) -> DockerAction {
        self.action
    }
}

fn push_create_options(args: &mut Vec<String>, spec: ContainerSpec) {
    args.push(format!("--name={}", spec.name));
    for (key, value) in &spec.labels {
        args.push(format!("--label={key}={value}"));
    }

    // Isolation
    args.push(format!("--network={}", spec.network));
    if let Some(ref user) = spec.user {
        args.push(format!("--user={user}"));
    }
    if spec.read_only {
        args.push("--read-only".to_string());
    }
    for mount in &spec.tmpfs {
        args.push(format!("--tmpfs={mount}"));
    }
    args.push("--cap-drop=ALL".to_string());
    args.push("--security-opt=no-new-privileges".to_string());

    // Resource limits
    if let Some(ref memory) = spec.limits.memory {
        args.push(format!("--memory={memory}"));
        // Equal swap limit disables swap
        args.push(format!("--memory-swap={memory}"));
    }
    if let Some(cpus) = spec.limits.cpus {
        args.push(format!("--cpus={cpus}"));
    }
    if let Some(pids) = spec.limits.pids {
        args.push(format!("--pids-limit={pids}"));
    }

    for entry in &spec.env {
        args.push(format!("--env={entry}"));
    }

    // Everything after the image is the container command
    args.push(spec.image);
    args.extend(spec.command);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerAction {
    /// Query the daemon version
    Version,
    /// Create a container without starting it
    Create,
    /// Start a container with stdout/stderr attached
    Start,
    /// Block until a container stops and print its exit code
    Wait,
    Kill,
    /// Force-remove a container
    Remove,
    /// List container ids
    List,
}

impl DockerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DockerAction::Version => "version",
            DockerAction::Create => "create",
            DockerAction::Start => "start",
            DockerAction::Wait => "wait",
            DockerAction::Kill => "kill",
            DockerAction::Remove => "rm",
            DockerAction::List => "ps",
        }
    }
}
