//! Docker backend against a live daemon
//!
//! Requires a reachable daemon and the default image
//! (`docker pull python:3.12-slim`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use boxrun::docker::{ContainerSandbox, MANAGED_LABEL};
use boxrun::types::{INTERNAL_EXIT_CODE, meta};
use boxrun::{Config, ContainerRuntime, DockerCli, Failure, Sandbox};

fn docker_sandbox() -> ContainerSandbox {
    ContainerSandbox::from_config(&Config::default())
}

/// Containers of this sandbox instance still known to the daemon
async fn leftovers(sandbox: &ContainerSandbox) -> usize {
    sandbox
        .runtime()
        .list(&sandbox.instance_label())
        .await
        .expect("Failed to list containers")
        .len()
}

#[tokio::test]
#[ignore = "requires docker daemon"]
async fn test_hello_world() {
    let sandbox = docker_sandbox();
    let result = sandbox
        .execute("print('hello')", 30.0)
        .await
        .expect("Execution failed");

    assert_eq!(result.exit_code(), 0, "stderr: {}", result.stderr());
    assert_eq!(result.stdout(), "hello\n");
    assert!(!result.timed_out_by_watchdog());
    assert_eq!(leftovers(&sandbox).await, 0);
}

#[tokio::test]
#[ignore = "requires docker daemon"]
async fn test_exit_code_and_stderr_pass_through() {
    let sandbox = docker_sandbox();
    let result = sandbox
        .execute("import sys\nprint('oops', file=sys.stderr)\nsys.exit(3)", 30.0)
        .await
        .unwrap();

    assert_eq!(result.exit_code(), 3);
    assert_eq!(result.stderr(), "oops\n");
    assert!(result.failure().is_none());
}

#[tokio::test]
#[ignore = "requires docker daemon"]
async fn test_sleep_times_out() {
    let config = Config::default();
    let grace = config.execution.kill_grace();
    let sandbox = ContainerSandbox::from_config(&config);
    let timeout = Duration::from_secs(2);

    let started = Instant::now();
    let result = sandbox
        .execute(
            "print('start', flush=True)\nimport time\ntime.sleep(60)",
            timeout.as_secs_f64(),
        )
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(result.timed_out_by_watchdog());
    assert_eq!(result.failure(), Some(Failure::Timeout));
    assert_eq!(result.exit_code(), INTERNAL_EXIT_CODE);
    assert!(result.stderr().to_lowercase().contains("timed out"));
    assert_eq!(result.stdout(), "start\n");

    // The watchdog never fires early
    let run_ms = result.meta()[meta::DURATION_MS].as_u64().unwrap();
    assert!(run_ms >= 2000, "run lasted {run_ms}ms");
    assert!(elapsed >= timeout);
    // Deadline, then at most one grace each for kill, output and removal,
    // plus container startup
    assert!(
        elapsed < timeout + grace * 3 + Duration::from_secs(5),
        "took {elapsed:?}"
    );
    assert_eq!(leftovers(&sandbox).await, 0);
}

#[tokio::test]
#[ignore = "requires docker daemon"]
async fn test_network_is_disabled() {
    let sandbox = docker_sandbox();
    let result = sandbox
        .execute(
            "import socket\ns = socket.socket()\ns.settimeout(2)\ns.connect(('1.1.1.1', 53))",
            30.0,
        )
        .await
        .unwrap();

    assert_ne!(result.exit_code(), 0);
    assert!(result.failure().is_none());
}

#[tokio::test]
#[ignore = "requires docker daemon"]
async fn test_files_do_not_leak_between_runs() {
    let sandbox = docker_sandbox();
    let write = sandbox
        .execute("open('/tmp/marker', 'w').write('x')\nprint('ok')", 30.0)
        .await
        .unwrap();
    assert_eq!(write.stdout(), "ok\n");

    let read = sandbox
        .execute("import os\nprint(os.path.exists('/tmp/marker'))", 30.0)
        .await
        .unwrap();
    assert_eq!(read.stdout(), "False\n");
}

#[tokio::test]
#[ignore = "requires docker daemon"]
async fn test_concurrent_executions_clean_up() {
    let sandbox = Arc::new(docker_sandbox());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let sandbox = Arc::clone(&sandbox);
            tokio::spawn(async move { sandbox.execute(&format!("print({i})"), 30.0).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.stdout(), format!("{i}\n"));
    }
    assert_eq!(leftovers(&sandbox).await, 0);
}

#[tokio::test]
#[ignore = "requires docker daemon"]
async fn test_managed_label_is_listable() {
    let docker = DockerCli::new(Config::default().docker.docker_binary());
    docker
        .list(&format!("{MANAGED_LABEL}=true"))
        .await
        .expect("Failed to list managed containers");
}
