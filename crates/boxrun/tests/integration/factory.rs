use boxrun::config::BACKEND_ENV;
use boxrun::{BackendKind, Config, ConfigError, Sandbox, create_sandbox, get_sandbox};

#[test]
fn test_default_backend_is_docker() {
    let sandbox = create_sandbox(&Config::default()).expect("Failed to create sandbox");
    assert_eq!(sandbox.backend(), BackendKind::Docker);
}

#[test]
fn test_selects_subprocess() {
    let config = Config {
        backend: "Subprocess".to_string(),
        ..Config::default()
    };
    let sandbox = create_sandbox(&config).expect("Failed to create sandbox");
    assert_eq!(sandbox.backend(), BackendKind::Subprocess);
}

#[test]
fn test_unknown_backend_fails_without_io() {
    let mut config = Config {
        backend: "vm".to_string(),
        ..Config::default()
    };
    config.docker.binary = Some("/nonexistent/docker".into());

    assert!(matches!(
        create_sandbox(&config),
        Err(ConfigError::UnknownBackend(ref name)) if name == "vm"
    ));
}

#[test]
fn test_get_sandbox_follows_environment() {
    // Reads the real process environment; only the unset case is predictable
    if std::env::var_os(BACKEND_ENV).is_some() {
        return;
    }
    if std::env::vars().any(|(key, _)| key.starts_with("BOXRUN_")) {
        return;
    }
    let sandbox = get_sandbox().expect("Failed to create sandbox");
    assert_eq!(sandbox.backend(), BackendKind::Docker);
}
