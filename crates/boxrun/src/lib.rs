//! Isolated execution of untrusted code snippets.
//!
//! boxrun runs a piece of code under a hard wall-clock deadline inside an
//! isolation backend and always hands back a structured
//! [`ExecutionResult`]: exit code, captured stdout and stderr, and metadata.
//! Daemon outages, timeouts and provisioning failures are reported through
//! that result rather than as errors.
//!
//! # Features
//!
//! - **Disposable containers**: one fresh docker container per execution, created
//!   with no network, a read-only root, dropped capabilities and resource limits,
//!   and force-removed on every exit path.
//! - **Deadline watchdog**: runs are killed when the timeout elapses; partial
//!   output is kept.
//! - **Pluggable backends**: docker or a local subprocess, selected by
//!   `SANDBOX_TYPE` or configuration.
//! - **Skills**: discover tool scripts and documentation from a directory and
//!   run them through any sandbox.
//!
//! ```rust,ignore
//! let sandbox = boxrun::get_sandbox()?;
//! let result = sandbox.execute("print('hello')", 5.0).await?;
//! assert_eq!(result.stdout(), "hello\n");
//! ```

pub use config::{BackendKind, Config, ConfigError, EXAMPLE_CONFIG};
pub use docker::{ContainerRuntime, ContainerSandbox, DockerCli, RuntimeError};
pub use sandbox::{Sandbox, SandboxError, Unavailable, create_sandbox, get_sandbox};
pub use skills::{SkillCatalog, SkillError, discover};
pub use subprocess::SubprocessSandbox;
pub use types::{ExecutionResult, Failure, ResourceLimits};

pub mod config;
pub mod docker;
pub mod sandbox;
pub mod skills;
pub mod subprocess;
pub mod types;
