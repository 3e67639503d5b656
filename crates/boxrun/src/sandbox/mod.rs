//! Sandbox contract
//!
//! A [`Sandbox`] executes a code snippet in isolation and reports every
//! execution-class outcome (non-zero exit, timeout, unavailable backend,
//! setup failure) through an [`ExecutionResult`]. Only misuse of the
//! interface surfaces as an error.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub(crate) use crate::sandbox::capture::mark_truncated;
pub use crate::sandbox::capture::{Captured, read_capped, read_capped_into};
pub use crate::sandbox::factory::{create_sandbox, get_sandbox};
use crate::config::{BackendKind, ExecutionSettings, seconds};
use crate::types::{ExecutionResult, meta};

mod capture;
mod factory;

/// Errors that indicate misuse of the sandbox interface
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("invalid timeout {0}: must be a finite number of seconds")]
    InvalidTimeout(f64),
}

/// Why a backend cannot run code right now
///
/// The rendered message is lower-case, names the backend and contains
/// either "not installed" or "not available"; callers classify on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unavailable {
    #[error("{backend} is not installed: executable '{program}' was not found")]
    NotInstalled {
        backend: BackendKind,
        program: String,
    },

    #[error("{backend} daemon is not available: {detail}")]
    Unreachable { backend: BackendKind, detail: String },
}

impl Unavailable {
    pub fn backend(&self) -> BackendKind {
        match self {
            Unavailable::NotInstalled { backend, .. } | Unavailable::Unreachable { backend, .. } => {
                *backend
            }
        }
    }

    /// Fold into the result reported to the caller
    pub fn into_result(self) -> ExecutionResult {
        let backend = self.backend();
        ExecutionResult::unavailable(self.to_string()).with_meta(meta::BACKEND, backend.as_str())
    }
}

/// An isolation backend
///
/// Instances hold no per-call state; `execute` may be called concurrently
/// and every call provisions and tears down its own environment.
#[async_trait]
pub trait Sandbox: Send + Sync + fmt::Debug {
    /// Backend implemented by this sandbox
    fn backend(&self) -> BackendKind;

    /// Check whether the backend can run code right now
    async fn probe(&self) -> Result<(), Unavailable>;

    /// Run `code` with a wall-clock deadline of `timeout_secs`
    ///
    /// Zero or negative timeouts select the configured default. Returns
    /// `Err` only for a NaN or infinite timeout.
    async fn execute(&self, code: &str, timeout_secs: f64)
    -> Result<ExecutionResult, SandboxError>;
}

/// Turn a caller-supplied timeout into the deadline actually enforced
pub fn resolve_timeout(
    timeout_secs: f64,
    settings: &ExecutionSettings,
) -> Result<Duration, SandboxError> {
    if !timeout_secs.is_finite() {
        return Err(SandboxError::InvalidTimeout(timeout_secs));
    }
    if timeout_secs <= 0.0 {
        return Ok(settings.default_timeout());
    }
    Ok(seconds(timeout_secs).min(settings.max_timeout()))
}
