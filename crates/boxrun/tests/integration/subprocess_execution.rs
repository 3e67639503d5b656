//! Subprocess backend against a real Python interpreter

use std::time::{Duration, Instant};

use boxrun::config::{ExecutionSettings, SubprocessConfig};
use boxrun::skills::discover;
use boxrun::{Failure, Sandbox, SubprocessSandbox};

use super::fixture;

/// Python sandbox, or `None` when python3 is not installed
async fn python_sandbox() -> Option<SubprocessSandbox> {
    let sandbox = SubprocessSandbox::new(SubprocessConfig::default(), ExecutionSettings::default());
    match sandbox.probe().await {
        Ok(()) => Some(sandbox),
        Err(e) => {
            eprintln!("skipping: {e}");
            None
        }
    }
}

#[tokio::test]
async fn test_hello_world() {
    let Some(sandbox) = python_sandbox().await else {
        return;
    };

    let result = sandbox
        .execute("print('hello')", 10.0)
        .await
        .expect("Execution failed");

    assert_eq!(result.exit_code(), 0);
    assert_eq!(result.stdout(), "hello\n");
    assert!(!result.timed_out_by_watchdog());
}

#[tokio::test]
async fn test_uncaught_exception() {
    let Some(sandbox) = python_sandbox().await else {
        return;
    };

    let result = sandbox
        .execute("raise ValueError('boom')", 10.0)
        .await
        .unwrap();

    assert_eq!(result.exit_code(), 1);
    assert!(result.stderr().contains("ValueError: boom"));
    assert!(result.failure().is_none());
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let Some(sandbox) = python_sandbox().await else {
        return;
    };

    let started = Instant::now();
    let result = sandbox
        .execute("print('before', flush=True)\nwhile True: pass", 1.0)
        .await
        .unwrap();

    assert_eq!(result.exit_code(), -1);
    assert!(result.timed_out_by_watchdog());
    assert_eq!(result.failure(), Some(Failure::Timeout));
    assert_eq!(result.stdout(), "before\n");
    assert!(result.stderr().to_lowercase().contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(6));
}

#[tokio::test]
async fn test_files_do_not_leak_between_runs() {
    let Some(sandbox) = python_sandbox().await else {
        return;
    };

    let write = sandbox
        .execute("open('marker.txt', 'w').write('x')\nprint('written')", 10.0)
        .await
        .unwrap();
    assert_eq!(write.stdout(), "written\n");

    let read = sandbox
        .execute("import os\nprint(os.path.exists('marker.txt'))", 10.0)
        .await
        .unwrap();
    assert_eq!(read.stdout(), "False\n");
}

#[tokio::test]
async fn test_environment_is_not_inherited() {
    let Some(sandbox) = python_sandbox().await else {
        return;
    };

    let result = sandbox
        .execute(
            "import os\nprint('CARGO_MANIFEST_DIR' in os.environ, os.environ['PATH'])",
            10.0,
        )
        .await
        .unwrap();
    assert_eq!(result.stdout(), "False /usr/local/bin:/usr/bin:/bin\n");
}

#[tokio::test]
async fn test_concurrent_executions() {
    let Some(sandbox) = python_sandbox().await else {
        return;
    };
    let sandbox = std::sync::Arc::new(sandbox);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let sandbox = sandbox.clone();
            tokio::spawn(async move { sandbox.execute(&format!("print({i} * 10)"), 10.0).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.stdout(), format!("{}\n", i * 10));
    }
}

#[tokio::test]
async fn test_skill_tool_runs_in_sandbox() {
    let Some(sandbox) = python_sandbox().await else {
        return;
    };
    let catalog = discover(&fixture("skills")).unwrap();

    let result = catalog
        .invoke(
            "word_count",
            &serde_json::json!({"text": "the quick brown fox"}),
            &sandbox,
            10.0,
        )
        .await
        .expect("Tool invocation failed");

    assert!(result.is_success());
    assert_eq!(result.stdout(), "4\n");
}
