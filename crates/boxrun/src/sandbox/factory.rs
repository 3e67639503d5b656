//! Backend selection

use tracing::debug;

use crate::config::{BackendKind, Config, ConfigError};
use crate::docker::ContainerSandbox;
use crate::sandbox::Sandbox;
use crate::subprocess::SubprocessSandbox;

/// Build the sandbox selected by the process environment
///
/// Loads configuration with [`Config::from_env`], so `SANDBOX_TYPE` picks
/// the backend and defaults to docker when unset.
pub fn get_sandbox() -> Result<Box<dyn Sandbox>, ConfigError> {
    let config = Config::from_env()?;
    create_sandbox(&config)
}

/// Build the sandbox named by `config.backend`
///
/// Performs no I/O; an unknown identifier fails with
/// [`ConfigError::UnknownBackend`].
pub fn create_sandbox(config: &Config) -> Result<Box<dyn Sandbox>, ConfigError> {
    let kind = config.backend_kind()?;
    debug!(backend = %kind, "creating sandbox");

    let sandbox: Box<dyn Sandbox> = match kind {
        BackendKind::Docker => Box::new(ContainerSandbox::from_config(config)),
        BackendKind::Subprocess => Box::new(SubprocessSandbox::from_config(config)),
    };
    Ok(sandbox)
}
