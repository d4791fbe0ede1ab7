use std::time::{Duration, Instant};

use wasm_exec::{ExecError, ExecRequest, FaultKind, ResourceLimits};

use super::{executor, executor_with, test_config};

fn execution_error(err: ExecError) -> wasm_exec::ExecutionError {
    match err {
        ExecError::Execution(e) => e,
        other => panic!("expected guest failure, got {other:?}"),
    }
}

#[test]
fn test_guest_error_carries_stderr() {
    let executor = executor("fail.wat");
    let err = execution_error(executor.exec("print(x)").unwrap_err());

    assert_eq!(err.fault, FaultKind::Exit(1));
    assert!(!err.is_budget_exhausted());
    assert_eq!(
        err.stderr,
        "Traceback (most recent call last):\n  File \"<string>\", line 1, in <module>\nNameError: name 'x' is not defined\n"
    );
    assert!(err.to_string().ends_with("NameError: name 'x' is not defined"));
}

#[test]
fn test_trap_is_a_guest_failure() {
    let executor = executor("trap.wat");
    let err = execution_error(executor.exec("").unwrap_err());

    assert_eq!(err.stderr, "about to trap\n");
    match err.fault {
        FaultKind::Trap(message) => assert!(message.contains("unreachable")),
        other => panic!("expected trap, got {other:?}"),
    }
}

#[test]
fn test_fuel_exhaustion_raises() {
    let executor = executor_with("spin.wat", test_config().with_fuel(1_000_000));
    let err = execution_error(executor.exec("while True: pass").unwrap_err());

    assert_eq!(err.fault, FaultKind::FuelExhausted);
    assert!(err.is_budget_exhausted());
    assert!(err.stderr.is_empty());
}

#[test]
fn test_request_fuel_overrides_configured_budget() {
    let mut config = test_config().with_fuel(u64::MAX / 4);
    config.limits = ResourceLimits::new().with_wall_time_limit(30.0);
    let executor = executor_with("spin.wat", config);

    let request = ExecRequest::new("").with_fuel(100_000);
    let err = execution_error(executor.exec_request(&request).unwrap_err());
    assert_eq!(err.fault, FaultKind::FuelExhausted);
}

#[test]
fn test_wall_time_limit_interrupts() {
    let mut config = test_config();
    config.limits = ResourceLimits::new().with_wall_time_limit(0.05);
    let executor = executor_with("spin.wat", config);

    let started = Instant::now();
    let err = execution_error(executor.exec("").unwrap_err());
    assert_eq!(err.fault, FaultKind::TimedOut);
    assert!(err.is_budget_exhausted());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_request_wall_time_limit() {
    let executor = executor("spin.wat");
    let request =
        ExecRequest::new("").with_limits(ResourceLimits::new().with_wall_time_limit(0.05));
    let err = execution_error(executor.exec_request(&request).unwrap_err());
    assert_eq!(err.fault, FaultKind::TimedOut);
}

#[test]
fn test_executor_survives_failures() {
    let executor = executor_with("spin.wat", test_config().with_fuel(10_000));
    for _ in 0..3 {
        let err = execution_error(executor.exec("").unwrap_err());
        assert_eq!(err.fault, FaultKind::FuelExhausted);
    }
}
