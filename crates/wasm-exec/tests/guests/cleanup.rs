use std::path::Path;
use std::sync::Arc;
use std::thread;

use wasm_exec::{Config, ExecError, ExecRequest, Executor, FaultKind, ResourceLimits};

use super::{executor_with, test_config};

fn config_in(root: &Path) -> Config {
    let mut config = test_config();
    config.temp_root = Some(root.to_path_buf());
    config
}

fn assert_empty(root: &Path) {
    let leftovers: Vec<_> = std::fs::read_dir(root)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert!(leftovers.is_empty(), "scratch directories left behind: {leftovers:?}");
}

#[test]
fn test_no_scratch_left_after_success() {
    let root = tempfile::tempdir().unwrap();
    let executor = executor_with("echo.wat", config_in(root.path()));
    executor.exec("print(1)").unwrap();
    assert_empty(root.path());
}

#[test]
fn test_no_scratch_left_after_guest_error() {
    let root = tempfile::tempdir().unwrap();
    let executor = executor_with("fail.wat", config_in(root.path()));
    executor.exec("print(x)").unwrap_err();
    assert_empty(root.path());
}

#[test]
fn test_no_scratch_left_after_budget_exhaustion() {
    let root = tempfile::tempdir().unwrap();
    let executor = executor_with("spin.wat", config_in(root.path()).with_fuel(10_000));
    executor.exec("").unwrap_err();
    assert_empty(root.path());
}

#[test]
fn test_no_scratch_left_after_wall_time_limit() {
    let root = tempfile::tempdir().unwrap();
    let mut config = config_in(root.path());
    config.limits = ResourceLimits::new().with_wall_time_limit(0.05);
    let executor = executor_with("spin.wat", config);

    match executor.exec("") {
        Err(ExecError::Execution(e)) => assert_eq!(e.fault, FaultKind::TimedOut),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_empty(root.path());
}

#[test]
fn test_no_scratch_left_after_link_error() {
    let root = tempfile::tempdir().unwrap();
    // Nothing binds the host imports, so instantiation fails
    let executor = executor_with("bindings.wat", config_in(root.path()));
    executor.exec("").unwrap_err();
    assert_empty(root.path());
}

#[test]
fn test_missing_temp_root_is_a_sandbox_error() {
    let root = tempfile::tempdir().unwrap();
    let missing = root.path().join("does-not-exist");
    let executor = executor_with("echo.wat", config_in(&missing));
    assert!(matches!(
        executor.exec("print(1)"),
        Err(ExecError::Sandbox(_))
    ));
}

#[test]
fn test_concurrent_runs_are_independent() {
    let root = tempfile::tempdir().unwrap();
    let executor = Arc::new(executor_with("echo.wat", config_in(root.path())));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let executor = Arc::clone(&executor);
            thread::spawn(move || {
                let source = format!("print({i})");
                let result = executor.exec(&source).unwrap();
                assert_eq!(result.text, source);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_empty(root.path());
}

#[tokio::test]
async fn test_async_runs_are_independent() {
    let root = tempfile::tempdir().unwrap();
    let executor: Executor = executor_with("echo.wat", config_in(root.path()));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let executor = executor.clone();
            tokio::spawn(async move {
                let request = ExecRequest::new(format!("print({i})"));
                executor.exec_async(request).await.unwrap().text
            })
        })
        .collect();
    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), format!("print({i})"));
    }

    assert_empty(root.path());
}
