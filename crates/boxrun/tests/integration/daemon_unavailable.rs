//! Behaviour with no reachable Docker daemon
//!
//! These tests run everywhere: they point the docker backend at a binary
//! that does not exist, or at a stand-in script that fails the way the
//! docker CLI does when the daemon is down.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use boxrun::config::{DockerConfig, ExecutionSettings};
use boxrun::docker::ContainerSandbox;
use boxrun::{DockerCli, Failure, Sandbox, Unavailable};

fn sandbox_with_binary(binary: &Path) -> ContainerSandbox {
    ContainerSandbox::new(
        Arc::new(DockerCli::new(binary)),
        DockerConfig::default(),
        ExecutionSettings::default(),
    )
}

/// Write an executable script standing in for a docker CLI whose daemon is down
#[cfg(unix)]
fn daemon_down_script(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("docker");
    std::fs::write(
        &path,
        "#!/bin/sh\n\
         echo 'Cannot connect to the Docker daemon at unix:///var/run/docker.sock. \
         Is the docker daemon running?' >&2\n\
         exit 1\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn assert_unavailable_diagnostic(stderr: &str) {
    let stderr = stderr.to_lowercase();
    assert!(stderr.contains("docker"), "diagnostic should name docker: {stderr}");
    assert!(
        stderr.contains("not installed") || stderr.contains("not available"),
        "diagnostic should classify the outage: {stderr}"
    );
}

#[tokio::test]
async fn test_missing_binary_reports_not_installed() {
    let sandbox = sandbox_with_binary(Path::new("/nonexistent/boxrun/docker"));

    let result = sandbox
        .execute("print('hello')", 5.0)
        .await
        .expect("execute should not error");

    assert_ne!(result.exit_code(), 0);
    assert_eq!(result.failure(), Some(Failure::Unavailable));
    assert!(result.stdout().is_empty());
    assert!(!result.timed_out_by_watchdog());
    assert!(result.stderr().to_lowercase().contains("not installed"));
    assert_unavailable_diagnostic(result.stderr());
}

#[tokio::test]
async fn test_probe_reports_not_installed() {
    let sandbox = sandbox_with_binary(Path::new("/nonexistent/boxrun/docker"));
    assert!(matches!(
        sandbox.probe().await,
        Err(Unavailable::NotInstalled { .. })
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_daemon_down_reports_not_available() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = sandbox_with_binary(&daemon_down_script(dir.path()));

    let result = sandbox.execute("print('hello')", 5.0).await.unwrap();

    assert_eq!(result.failure(), Some(Failure::Unavailable));
    assert!(result.stderr().contains("not available"));
    assert!(result.stderr().contains("Cannot connect to the Docker daemon"));
    assert_unavailable_diagnostic(result.stderr());
}

#[tokio::test]
async fn test_repeated_calls_are_identical() {
    let sandbox = sandbox_with_binary(Path::new("/nonexistent/boxrun/docker"));

    let first = sandbox.execute("print(1)", 1.0).await.unwrap();
    for _ in 0..10 {
        let again = sandbox.execute("print(1)", 1.0).await.unwrap();
        assert_eq!(again, first);
    }
}

#[tokio::test]
async fn test_invalid_timeout_is_an_error_even_when_unavailable() {
    let sandbox = sandbox_with_binary(Path::new("/nonexistent/boxrun/docker"));
    assert!(sandbox.execute("print(1)", f64::NAN).await.is_err());
}
