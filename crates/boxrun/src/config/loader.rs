//! Configuration loading for boxrun
//!
//! Handles loading and layering configuration sources using the config crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config as ConfigBuilder, Environment, File, FileFormat, FileSourceString};

use crate::config::{CODE_PLACEHOLDER, Config, ConfigError, EXAMPLE_CONFIG, MAX_SECONDS};

/// Environment variable selecting the sandbox backend
pub const BACKEND_ENV: &str = "SANDBOX_TYPE";

/// Environment variable pointing at a configuration file
pub const CONFIG_PATH_ENV: &str = "BOXRUN_CONFIG";

const ENV_PREFIX: &str = "BOXRUN";

impl Config {
    /// Load configuration from a file over the embedded defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(defaults())
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string over the embedded defaults
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(defaults())
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the process environment
    ///
    /// Reads the optional file named by `BOXRUN_CONFIG`, then applies
    /// `BOXRUN_*` overrides and finally `SANDBOX_TYPE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let path = vars.get(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::layered(path.as_deref(), vars)
    }

    /// Load an optional file with environment overrides from the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::layered(path, std::env::vars().collect())
    }

    /// Layer an optional file and the given environment variables
    ///
    /// Precedence (lowest first): embedded defaults, file, `BOXRUN_*`
    /// variables, `SANDBOX_TYPE`.
    pub fn layered(
        path: Option<&Path>,
        vars: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let backend = vars.get(BACKEND_ENV).cloned();

        let mut builder = ConfigBuilder::builder().add_source(defaults());
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.into_iter().collect())),
            )
            .set_override_option("backend", backend)?
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        let execution = &self.execution;
        check_seconds("execution.default_timeout", execution.default_timeout)?;
        check_seconds("execution.max_timeout", execution.max_timeout)?;
        if execution.max_timeout < execution.default_timeout {
            return Err(ConfigError::Invalid(
                "execution.max_timeout must not be below default_timeout".to_string(),
            ));
        }
        check_seconds("execution.kill_grace", execution.kill_grace)?;
        if execution.max_output == 0 {
            return Err(ConfigError::Invalid(
                "execution.max_output must be greater than zero".to_string(),
            ));
        }

        let docker = &self.docker;
        if docker.image.trim().is_empty() {
            return Err(ConfigError::Invalid("docker.image is empty".to_string()));
        }
        validate_command("docker", &docker.command)?;
        check_seconds("docker.ping_timeout", docker.ping_timeout)?;
        for entry in &docker.env {
            match entry.split_once('=') {
                Some((key, _)) if !key.is_empty() => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "docker.env entry '{entry}' is not KEY=VALUE"
                    )));
                }
            }
        }
        if let Some(cpus) = docker.limits.cpus
            && !(cpus.is_finite() && cpus > 0.0)
        {
            return Err(ConfigError::Invalid(
                "docker.limits.cpus must be positive".to_string(),
            ));
        }

        validate_command("subprocess", &self.subprocess.command)?;

        Ok(())
    }
}

/// Embedded defaults, the lowest layer of every load
fn defaults() -> File<FileSourceString, FileFormat> {
    File::from_str(EXAMPLE_CONFIG, FileFormat::Toml)
}

fn check_seconds(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= MAX_SECONDS {
        return Ok(());
    }
    Err(ConfigError::Invalid(format!(
        "{key} must be a positive number of seconds no greater than {MAX_SECONDS}"
    )))
}

fn validate_command(section: &str, command: &[String]) -> Result<(), ConfigError> {
    if command.is_empty() {
        return Err(ConfigError::Invalid(format!("{section}.command is empty")));
    }
    if !command.iter().any(|arg| arg.contains(CODE_PLACEHOLDER)) {
        return Err(ConfigError::Invalid(format!(
            "{section}.command has no {CODE_PLACEHOLDER} placeholder"
        )));
    }
    Ok(())
}
