use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exit code reserved for terminations decided by the sandbox itself
/// (timeout, unavailable backend, setup failure).
pub const INTERNAL_EXIT_CODE: i32 = -1;

/// Open metadata attached to an [`ExecutionResult`]
pub type Meta = BTreeMap<String, Value>;

/// Well-known metadata keys
pub mod meta {
    /// `true` iff the deadline watchdog terminated the execution
    pub const TIMED_OUT: &str = "timed_out";
    /// Backend identifier that produced the result
    pub const BACKEND: &str = "backend";
    /// Sandbox-internal failure class, see [`super::Failure`]
    pub const FAILURE: &str = "failure";
    /// Wall-clock duration of the run phase in milliseconds
    pub const DURATION_MS: &str = "duration_ms";
    pub const STDOUT_TRUNCATED: &str = "stdout_truncated";
    pub const STDERR_TRUNCATED: &str = "stderr_truncated";
    /// Name of the ephemeral container
    pub const CONTAINER: &str = "container";
}

/// Outcome of a single `execute` call
///
/// Created fresh for every call and never mutated once handed to the caller.
/// `stdout` and `stderr` are always present (possibly empty).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    exit_code: i32,
    stdout: String,
    stderr: String,
    #[serde(default)]
    meta: Meta,
}

impl ExecutionResult {
    /// The process ran to completion; streams and exit code are passed through
    pub fn completed(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            meta: Meta::new(),
        }
        .with_meta(meta::TIMED_OUT, false)
    }

    /// The watchdog fired and the execution was killed
    ///
    /// Whatever was captured before the kill is kept; a "timed out" marker is
    /// appended to stderr.
    pub fn timed_out(
        timeout: Duration,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        let mut stderr = stderr.into();
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!(
            "execution timed out after {}s",
            timeout.as_secs_f64()
        ));

        Self {
            exit_code: INTERNAL_EXIT_CODE,
            stdout: stdout.into(),
            stderr,
            meta: Meta::new(),
        }
        .with_meta(meta::TIMED_OUT, true)
        .with_meta(meta::FAILURE, Failure::Timeout.as_str())
    }

    /// The backend could not be reached; nothing was executed
    pub fn unavailable(diagnostic: impl Into<String>) -> Self {
        Self::internal(Failure::Unavailable, diagnostic.into())
    }

    /// Provisioning or supervising the execution failed unexpectedly
    pub fn setup_failed(diagnostic: impl Into<String>) -> Self {
        Self::internal(Failure::Setup, diagnostic.into())
    }

    fn internal(failure: Failure, stderr: String) -> Self {
        Self {
            exit_code: INTERNAL_EXIT_CODE,
            stdout: String::new(),
            stderr,
            meta: Meta::new(),
        }
        .with_meta(meta::FAILURE, failure.as_str())
    }

    /// Attach a metadata entry while the result is still being assembled
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Whether the deadline watchdog terminated this execution
    #[must_use]
    pub fn timed_out_by_watchdog(&self) -> bool {
        self.meta.get(meta::TIMED_OUT).and_then(Value::as_bool) == Some(true)
    }

    /// Sandbox-internal failure class, if any
    pub fn failure(&self) -> Option<Failure> {
        self.meta
            .get(meta::FAILURE)
            .and_then(Value::as_str)
            .and_then(Failure::from_str_opt)
    }

    /// Check if the process ran and exited with code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.failure().is_none()
    }
}

/// Class of a sandbox-internal termination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Failure {
    /// Deadline elapsed
    Timeout,
    /// Backend daemon or interpreter unreachable
    Unavailable,
    /// Unexpected error while provisioning or supervising
    Setup,
}

impl Failure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Failure::Timeout => "timeout",
            Failure::Unavailable => "unavailable",
            Failure::Setup => "setup",
        }
    }

    fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "timeout" => Some(Failure::Timeout),
            "unavailable" => Some(Failure::Unavailable),
            "setup" => Some(Failure::Setup),
            _ => None,
        }
    }
}

/// Resource limits handed to the container runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit in docker notation (e.g. "256m")
    #[serde(default)]
    pub memory: Option<String>,

    /// Number of CPUs (fractional allowed)
    #[serde(default)]
    pub cpus: Option<f64>,

    /// Maximum number of processes/threads
    #[serde(default)]
    pub pids: Option<u32>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory: Some("256m".to_string()),
            cpus: Some(1.0),
            pids: Some(64),
        }
    }
}
