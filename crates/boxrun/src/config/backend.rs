use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::ConfigError;

/// Closed set of sandbox backends the factory can build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One disposable docker container per execution
    Docker,
    /// Local interpreter process in a temporary directory
    Subprocess,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Docker, BackendKind::Subprocess];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Docker => "docker",
            BackendKind::Subprocess => "subprocess",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownBackend(s.to_string()))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
