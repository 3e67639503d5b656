use std::collections::HashMap;
use std::path::PathBuf;

use boxrun::config::{BACKEND_ENV, BackendKind, Config, ConfigError};

use super::fixture;

#[test]
fn test_load_valid_config() {
    let config =
        Config::from_file(fixture("configs/valid_full.toml")).expect("Failed to load config");

    assert_eq!(config.backend_kind().unwrap(), BackendKind::Subprocess);
    assert_eq!(config.execution.default_timeout, 10.0);
    assert_eq!(config.execution.max_timeout, 120.0);
    assert_eq!(config.execution.max_output, 65536);
    assert_eq!(config.docker.image, "python:3.11-alpine");
    assert_eq!(config.docker.command, vec!["python3", "-u", "-c", "{code}"]);
    assert_eq!(config.docker.user.as_deref(), Some("1000:1000"));
    assert_eq!(config.docker.env, vec!["LANG=C.UTF-8"]);
    assert_eq!(config.docker.limits.memory.as_deref(), Some("128m"));
    assert_eq!(config.docker.limits.cpus, Some(0.5));
    assert_eq!(config.docker.limits.pids, Some(32));
    assert_eq!(config.subprocess.path, "/usr/bin:/bin");
    assert_eq!(config.skills.dir, PathBuf::from("/opt/boxrun/skills"));
}

#[test]
fn test_load_minimal_config() {
    let config =
        Config::from_file(fixture("configs/valid_minimal.toml")).expect("Failed to load config");

    assert_eq!(config.docker.image, "python:3.13-slim");
    assert_eq!(config.backend_kind().unwrap(), BackendKind::Docker);
    assert_eq!(config.execution, Config::default().execution);
}

#[test]
fn test_load_unknown_backend_defers_to_factory() {
    let config = Config::from_file(fixture("configs/unknown_backend.toml"))
        .expect("Unknown backend is not a load error");
    assert!(matches!(
        config.backend_kind(),
        Err(ConfigError::UnknownBackend(_))
    ));
}

#[test]
fn test_load_invalid_no_placeholder() {
    let result = Config::from_file(fixture("configs/invalid_no_placeholder.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_timeouts() {
    let result = Config::from_file(fixture("configs/invalid_timeouts.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_syntax() {
    let result = Config::from_file(fixture("configs/invalid_syntax.toml"));
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_load_missing_file() {
    assert!(Config::from_file(fixture("configs/does_not_exist.toml")).is_err());
}

#[test]
fn test_environment_overrides_file() {
    let vars = HashMap::from([
        (BACKEND_ENV.to_string(), "docker".to_string()),
        ("BOXRUN_EXECUTION__MAX_OUTPUT".to_string(), "1024".to_string()),
    ]);
    let path = fixture("configs/valid_full.toml");
    let config = Config::layered(Some(&path), vars).unwrap();

    assert_eq!(config.backend_kind().unwrap(), BackendKind::Docker);
    assert_eq!(config.execution.max_output, 1024);
    assert_eq!(config.docker.image, "python:3.11-alpine");
}

#[test]
fn test_embedded_example_is_loadable() {
    let config = Config::parse_toml(boxrun::EXAMPLE_CONFIG).unwrap();
    assert_eq!(config, Config::default());
}
