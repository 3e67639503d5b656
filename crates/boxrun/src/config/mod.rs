use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::backend::BackendKind;
pub use crate::config::loader::{BACKEND_ENV, CONFIG_PATH_ENV};
use crate::types::ResourceLimits;

mod backend;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../boxrun.example.toml");

/// Placeholder replaced by the code snippet in interpreter commands
pub const CODE_PLACEHOLDER: &str = "{code}";

/// Largest number of seconds accepted for any configured duration
pub const MAX_SECONDS: f64 = u32::MAX as f64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown sandbox backend '{0}' (expected one of: docker, subprocess)")]
    UnknownBackend(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for boxrun
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Backend identifier resolved by the sandbox factory.
    ///
    /// Kept as a raw string so that an unknown value is reported by the
    /// factory rather than by the loader.
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default)]
    pub execution: ExecutionSettings,

    #[serde(default)]
    pub docker: DockerConfig,

    #[serde(default)]
    pub subprocess: SubprocessConfig,

    #[serde(default)]
    pub skills: SkillsConfig,
}

/// Settings shared by every backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Timeout in seconds used when the caller passes zero or a negative value
    #[serde(default = "default_timeout")]
    pub default_timeout: f64,

    /// Upper bound in seconds for any requested timeout
    #[serde(default = "default_max_timeout")]
    pub max_timeout: f64,

    /// Bytes kept per captured stream
    #[serde(default = "default_max_output")]
    pub max_output: usize,

    /// Seconds to wait for partial output once a timed-out run is killed
    #[serde(default = "default_kill_grace")]
    pub kill_grace: f64,
}

impl ExecutionSettings {
    pub fn default_timeout(&self) -> Duration {
        seconds(self.default_timeout)
    }

    pub fn max_timeout(&self) -> Duration {
        seconds(self.max_timeout)
    }

    pub fn kill_grace(&self) -> Duration {
        seconds(self.kill_grace)
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            max_timeout: default_max_timeout(),
            max_output: default_max_output(),
            kill_grace: default_kill_grace(),
        }
    }
}

/// Settings for the docker backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Path to the docker CLI (uses PATH if not specified)
    #[serde(default)]
    pub binary: Option<PathBuf>,

    /// Image every ephemeral container is created from
    #[serde(default = "default_image")]
    pub image: String,

    /// Interpreter command; `{code}` is replaced by the snippet
    #[serde(default = "default_docker_command")]
    pub command: Vec<String>,

    /// Network mode passed to `docker create --network`
    #[serde(default = "default_network")]
    pub network: String,

    /// User the interpreter runs as inside the container
    #[serde(default = "default_user")]
    pub user: Option<String>,

    /// Mount the container root filesystem read-only
    #[serde(default = "default_read_only")]
    pub read_only: bool,

    /// tmpfs mounts in docker notation (`/tmp:rw,size=64m`)
    #[serde(default = "default_tmpfs")]
    pub tmpfs: Vec<String>,

    /// Environment entries as `KEY=VALUE`
    #[serde(default = "default_docker_env")]
    pub env: Vec<String>,

    /// Seconds allowed for the daemon availability probe
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: f64,

    #[serde(default)]
    pub limits: ResourceLimits,
}

impl DockerConfig {
    /// Get the path to the docker binary
    pub fn docker_binary(&self) -> PathBuf {
        self.binary
            .clone()
            .unwrap_or_else(|| PathBuf::from("docker"))
    }

    pub fn ping_timeout(&self) -> Duration {
        seconds(self.ping_timeout)
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: None,
            image: default_image(),
            command: default_docker_command(),
            network: default_network(),
            user: default_user(),
            read_only: default_read_only(),
            tmpfs: default_tmpfs(),
            env: default_docker_env(),
            ping_timeout: default_ping_timeout(),
            limits: ResourceLimits::default(),
        }
    }
}

/// Settings for the local subprocess backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubprocessConfig {
    /// Interpreter command; `{code}` is replaced by the snippet
    #[serde(default = "default_subprocess_command")]
    pub command: Vec<String>,

    /// PATH visible to the interpreter
    #[serde(default = "default_subprocess_path")]
    pub path: String,
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self {
            command: default_subprocess_command(),
            path: default_subprocess_path(),
        }
    }
}

/// Settings for skill discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillsConfig {
    #[serde(default = "default_skills_dir")]
    pub dir: PathBuf,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            dir: default_skills_dir(),
        }
    }
}

impl Config {
    /// Create a new config with the embedded defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the configured backend identifier
    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        self.backend.parse()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

/// Convert seconds to a `Duration`, clamped to `0..=MAX_SECONDS`
///
/// NaN maps to zero.
pub(crate) fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.clamp(0.0, MAX_SECONDS)).unwrap_or_default()
}

/// Expand the `{code}` placeholder in an interpreter command
pub fn expand_command(command: &[String], code: &str) -> Vec<String> {
    command
        .iter()
        .map(|arg| arg.replace(CODE_PLACEHOLDER, code))
        .collect()
}

fn default_backend() -> String {
    BackendKind::Docker.as_str().to_string()
}

fn default_timeout() -> f64 {
    30.0
}

fn default_max_timeout() -> f64 {
    600.0
}

fn default_max_output() -> usize {
    1024 * 1024
}

fn default_kill_grace() -> f64 {
    2.0
}

fn default_image() -> String {
    "python:3.12-slim".to_string()
}

fn default_docker_command() -> Vec<String> {
    vec!["python3".into(), "-c".into(), CODE_PLACEHOLDER.into()]
}

fn default_network() -> String {
    "none".to_string()
}

fn default_user() -> Option<String> {
    Some("65534:65534".to_string())
}

fn default_read_only() -> bool {
    true
}

fn default_tmpfs() -> Vec<String> {
    vec!["/tmp:rw,size=64m".to_string()]
}

fn default_docker_env() -> Vec<String> {
    vec![
        "PYTHONDONTWRITEBYTECODE=1".to_string(),
        "PYTHONUNBUFFERED=1".to_string(),
    ]
}

fn default_ping_timeout() -> f64 {
    5.0
}

fn default_subprocess_command() -> Vec<String> {
    vec![
        "python3".into(),
        "-I".into(),
        "-c".into(),
        CODE_PLACEHOLDER.into(),
    ]
}

fn default_subprocess_path() -> String {
    "/usr/local/bin:/usr/bin:/bin".to_string()
}

fn default_skills_dir() -> PathBuf {
    PathBuf::from("skills")
}
