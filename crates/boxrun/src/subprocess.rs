//! Local interpreter backend
//!
//! Runs the snippet in a child process with a fresh temporary working
//! directory and a scrubbed environment. This isolates far less than a
//! container (no namespaces, no resource limits) and is meant for
//! development machines without a docker daemon.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, instrument, warn};

use crate::config::{BackendKind, Config, ExecutionSettings, SubprocessConfig, expand_command};
use crate::sandbox::{
    Captured, Sandbox, SandboxError, Unavailable, mark_truncated, read_capped_into,
    resolve_timeout,
};
use crate::types::{ExecutionResult, meta};

/// Sandbox running each snippet as a local child process
#[derive(Debug, Clone)]
pub struct SubprocessSandbox {
    subprocess: SubprocessConfig,
    execution: ExecutionSettings,
}

impl SubprocessSandbox {
    pub fn new(subprocess: SubprocessConfig, execution: ExecutionSettings) -> Self {
        Self {
            subprocess,
            execution,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.subprocess.clone(), config.execution.clone())
    }

    fn interpreter(&self) -> &str {
        self.subprocess
            .command
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Locate the interpreter on the configured PATH
    fn resolve_interpreter(&self) -> Result<PathBuf, Unavailable> {
        let program = self.interpreter();
        let not_installed = || Unavailable::NotInstalled {
            backend: BackendKind::Subprocess,
            program: program.to_string(),
        };

        if program.is_empty() {
            return Err(not_installed());
        }
        if program.contains('/') {
            let path = PathBuf::from(program);
            return if is_executable(&path) {
                Ok(path)
            } else {
                Err(not_installed())
            };
        }

        std::env::split_paths(&self.subprocess.path)
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(not_installed)
    }

    fn finish(
        &self,
        status: Option<ExitStatus>,
        stdout: &Captured,
        stderr: &Captured,
        timeout: Duration,
        elapsed: Duration,
    ) -> ExecutionResult {
        let result = match status {
            Some(status) => ExecutionResult::completed(
                exit_code(status),
                stdout.to_text(),
                stderr.to_text(),
            ),
            None => ExecutionResult::timed_out(timeout, stdout.to_text(), stderr.to_text()),
        };

        mark_truncated(result, stdout, stderr)
            .with_meta(meta::BACKEND, BackendKind::Subprocess.as_str())
            .with_meta(
                meta::DURATION_MS,
                u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            )
    }
}

#[async_trait]
impl Sandbox for SubprocessSandbox {
    fn backend(&self) -> BackendKind {
        BackendKind::Subprocess
    }

    async fn probe(&self) -> Result<(), Unavailable> {
        self.resolve_interpreter().map(|_| ())
    }

    #[instrument(skip(self, code), fields(code_len = code.len()))]
    async fn execute(
        &self,
        code: &str,
        timeout_secs: f64,
    ) -> Result<ExecutionResult, SandboxError> {
        let timeout = resolve_timeout(timeout_secs, &self.execution)?;

        let program = match self.resolve_interpreter() {
            Ok(program) => program,
            Err(unavailable) => {
                warn!(%unavailable, "subprocess backend unavailable");
                return Ok(unavailable.into_result());
            }
        };

        let workdir = match tempfile::Builder::new().prefix("boxrun-").tempdir() {
            Ok(dir) => dir,
            Err(e) => return Ok(setup_failure(format!("failed to create working directory: {e}"))),
        };

        let args = expand_command(&self.subprocess.command, code);
        debug!(program = %program.display(), workdir = %workdir.path().display(), "spawning interpreter");

        let mut command = Command::new(&program);
        command
            .args(&args[1..])
            .current_dir(workdir.path())
            .env_clear()
            .env("PATH", &self.subprocess.path)
            .env("HOME", workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return Ok(setup_failure(format!("failed to spawn interpreter: {e}"))),
        };
        let mut group = ProcessGroup::of(&child);

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut stdout = Captured::default();
        let mut stderr = Captured::default();
        let max_output = self.execution.max_output;
        let grace = self.execution.kill_grace();
        let started = Instant::now();

        let outcome = {
            let run = async {
                let reading = read_streams(
                    &mut stdout_pipe,
                    &mut stderr_pipe,
                    max_output,
                    &mut stdout,
                    &mut stderr,
                );
                tokio::pin!(reading);

                let mut drained = false;
                let status = tokio::select! {
                    biased;

                    status = child.wait() => status,
                    () = &mut reading => {
                        drained = true;
                        child.wait().await
                    }
                };

                // Background jobs left behind would hold the pipes open
                group.kill();
                if !drained && tokio::time::timeout(grace, reading).await.is_err() {
                    debug!("output pipes still open after kill grace");
                }
                status
            };

            tokio::select! {
                biased;

                status = run => Some(status),
                _ = tokio::time::sleep(timeout) => None,
            }
        };

        let status = match outcome {
            Some(Ok(status)) => Some(status),
            Some(Err(e)) => {
                return Ok(setup_failure(format!("failed to wait for interpreter: {e}")));
            }
            None => {
                warn!(timeout_secs = timeout.as_secs_f64(), "deadline elapsed, killing interpreter");
                group.kill();
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "kill failed");
                }

                let collected = tokio::time::timeout(grace, async {
                    if let Err(e) = child.wait().await {
                        debug!(error = %e, "wait after kill failed");
                    }
                    read_streams(
                        &mut stdout_pipe,
                        &mut stderr_pipe,
                        max_output,
                        &mut stdout,
                        &mut stderr,
                    )
                    .await;
                })
                .await;
                if collected.is_err() {
                    debug!("no remaining output within kill grace");
                }
                None
            }
        };
        let elapsed = started.elapsed();

        let result = self.finish(status, &stdout, &stderr, timeout, elapsed);

        if let Err(e) = workdir.close() {
            warn!(error = %e, "failed to remove working directory");
        }

        Ok(result)
    }
}

fn setup_failure(message: String) -> ExecutionResult {
    ExecutionResult::setup_failed(format!("subprocess sandbox error: {message}"))
        .with_meta(meta::BACKEND, BackendKind::Subprocess.as_str())
}

/// The interpreter's process group
///
/// Background jobs started by the snippet share the group. It is killed
/// once, either explicitly or when dropped with the cancelled call.
#[derive(Debug)]
struct ProcessGroup {
    id: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { id: child.id() }
    }

    fn kill(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        #[cfg(unix)]
        {
            let Ok(pgid) = libc::pid_t::try_from(id) else {
                return;
            };
            // SAFETY: kill(2) reads no memory; a negative pid addresses the group
            if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
                let err = std::io::Error::last_os_error();
                // ESRCH: every member already exited
                if err.raw_os_error() != Some(libc::ESRCH) {
                    debug!(error = %err, pgid, "failed to kill process group");
                }
            }
        }
        #[cfg(not(unix))]
        let _ = id;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Read both pipes concurrently until EOF
async fn read_streams(
    stdout_pipe: &mut Option<ChildStdout>,
    stderr_pipe: &mut Option<ChildStderr>,
    limit: usize,
    stdout: &mut Captured,
    stderr: &mut Captured,
) {
    tokio::join!(
        drain(stdout_pipe.as_mut(), limit, stdout),
        drain(stderr_pipe.as_mut(), limit, stderr),
    );
}

async fn drain<R>(pipe: Option<&mut R>, limit: usize, captured: &mut Captured)
where
    R: AsyncRead + Unpin,
{
    if let Some(reader) = pipe
        && let Err(e) = read_capped_into(reader, limit, captured).await
    {
        debug!(error = %e, "failed to read interpreter output");
    }
}

/// Exit code as a shell would report it (128 + signal for signal deaths)
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
