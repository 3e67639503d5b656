//! Per-execution container state machine
//!
//! Every `execute` call walks the same sequence:
//!
//! 1. probe the daemon; if it does not answer, report unavailable without
//!    creating anything
//! 2. create a fresh container and take ownership of it in a
//!    [`ContainerGuard`]
//! 3. run it on a separate task while a deadline timer races it
//! 4. on deadline, kill the container and wait briefly for partial output
//! 5. release the guard, which force-removes the container
//!
//! Nothing from one call is reused by another.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::{BackendKind, Config, DockerConfig, ExecutionSettings, expand_command};
use crate::docker::{
    ContainerGuard, ContainerRuntime, ContainerSpec, DockerCli, INSTANCE_LABEL, MANAGED_LABEL,
    RunOutput, RuntimeError,
};
use crate::sandbox::{Sandbox, SandboxError, Unavailable, mark_truncated, resolve_timeout};
use crate::types::{ExecutionResult, meta};

/// Sandbox running each snippet in a disposable container
#[derive(Debug)]
pub struct ContainerSandbox {
    runtime: Arc<dyn ContainerRuntime>,
    docker: DockerConfig,
    execution: ExecutionSettings,
    /// Distinguishes containers created by this instance
    instance: String,
}

impl ContainerSandbox {
    /// Create a sandbox over any container runtime
    ///
    /// Performs no I/O.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        docker: DockerConfig,
        execution: ExecutionSettings,
    ) -> Self {
        Self {
            runtime,
            docker,
            execution,
            instance: Uuid::new_v4().to_string(),
        }
    }

    /// Create a sandbox driving the configured docker binary
    pub fn from_config(config: &Config) -> Self {
        let runtime = Arc::new(DockerCli::new(config.docker.docker_binary()));
        Self::new(runtime, config.docker.clone(), config.execution.clone())
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Label (`key=value`) carried by every container of this instance
    pub fn instance_label(&self) -> String {
        format!("{INSTANCE_LABEL}={}", self.instance)
    }

    fn container_spec(&self, code: &str) -> ContainerSpec {
        let labels = BTreeMap::from([
            (MANAGED_LABEL.to_string(), "true".to_string()),
            (INSTANCE_LABEL.to_string(), self.instance.clone()),
        ]);

        ContainerSpec {
            name: format!("boxrun-{}", Uuid::new_v4().simple()),
            image: self.docker.image.clone(),
            command: expand_command(&self.docker.command, code),
            labels,
            network: self.docker.network.clone(),
            user: self.docker.user.clone(),
            read_only: self.docker.read_only,
            tmpfs: self.docker.tmpfs.clone(),
            env: self.docker.env.clone(),
            limits: self.docker.limits.clone(),
        }
    }

    /// Race the container run against the deadline
    async fn supervise(&self, guard: &ContainerGuard, timeout: Duration) -> ExecutionResult {
        let runtime = Arc::clone(&self.runtime);
        let id = guard.id().clone();
        let max_output = self.execution.max_output;
        let started = Instant::now();

        let mut run = tokio::spawn(async move { runtime.run(&id, max_output).await });

        tokio::select! {
            biased;

            joined = &mut run => {
                let elapsed = started.elapsed();
                match joined {
                    Ok(Ok(output)) => {
                        debug!(exit_code = output.exit_code, ?elapsed, "container finished");
                        output.into_result().with_meta(meta::DURATION_MS, millis(elapsed))
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "container run failed");
                        setup_failure(&e)
                    }
                    Err(e) => {
                        warn!(error = %e, "container run task failed");
                        ExecutionResult::setup_failed(format!("docker sandbox error: {e}"))
                    }
                }
            }
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs_f64(), "deadline elapsed, killing container");
                let grace = self.execution.kill_grace();
                match tokio::time::timeout(grace, self.runtime.kill(guard.id())).await {
                    Ok(Ok(())) => {}
                    // The container may have exited on its own in the meantime
                    Ok(Err(e)) => debug!(error = %e, "kill failed"),
                    Err(_) => warn!("kill did not complete within kill grace"),
                }

                let partial = match tokio::time::timeout(grace, &mut run).await {
                    Ok(Ok(Ok(output))) => output,
                    Ok(_) => RunOutput::default(),
                    Err(_) => {
                        debug!("no output within kill grace");
                        run.abort();
                        RunOutput::default()
                    }
                };

                let result = ExecutionResult::timed_out(
                    timeout,
                    partial.stdout.to_text(),
                    partial.stderr.to_text(),
                );
                mark_truncated(result, &partial.stdout, &partial.stderr)
                    .with_meta(meta::DURATION_MS, millis(started.elapsed()))
            }
        }
    }
}

#[async_trait]
impl Sandbox for ContainerSandbox {
    fn backend(&self) -> BackendKind {
        BackendKind::Docker
    }

    async fn probe(&self) -> Result<(), Unavailable> {
        let ping_timeout = self.docker.ping_timeout();
        match tokio::time::timeout(ping_timeout, self.runtime.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into_unavailable(BackendKind::Docker)),
            Err(_) => Err(Unavailable::Unreachable {
                backend: BackendKind::Docker,
                detail: format!("no response within {}s", ping_timeout.as_secs_f64()),
            }),
        }
    }

    #[instrument(skip(self, code), fields(instance = %self.instance, code_len = code.len()))]
    async fn execute(
        &self,
        code: &str,
        timeout_secs: f64,
    ) -> Result<ExecutionResult, SandboxError> {
        let timeout = resolve_timeout(timeout_secs, &self.execution)?;

        if let Err(unavailable) = self.probe().await {
            warn!(%unavailable, "docker backend unavailable");
            return Ok(unavailable.into_result());
        }

        let spec = self.container_spec(code);
        let name = spec.name.clone();
        let id = match self.runtime.create(&spec).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "failed to create container");
                return Ok(setup_failure(&e).with_meta(meta::BACKEND, BackendKind::Docker.as_str()));
            }
        };
        debug!(%id, %name, "container provisioned");

        let guard = ContainerGuard::new(Arc::clone(&self.runtime), id);
        let result = self.supervise(&guard, timeout).await;

        // A removal still pending at the grace is finished by the guard's drop
        match tokio::time::timeout(self.execution.kill_grace(), guard.release()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(container = %name, error = %e, "failed to remove container"),
            Err(_) => warn!(container = %name, "removal still pending, continuing in background"),
        }

        Ok(result
            .with_meta(meta::BACKEND, BackendKind::Docker.as_str())
            .with_meta(meta::CONTAINER, name))
    }
}

fn setup_failure(err: &RuntimeError) -> ExecutionResult {
    ExecutionResult::setup_failed(format!("docker sandbox error: {err}"))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
