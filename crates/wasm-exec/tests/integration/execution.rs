use wasm_exec::{Executor, FaultKind, ResourceLimits};

use super::{guest_failure, python, test_config};

#[test]
#[ignore = "requires python wasm runtime"]
fn test_hello_world_without_fuel() {
    let executor = python();
    let result = executor.exec("print('Hello, world!')").unwrap();

    assert_eq!(result.text, "Hello, world!");
    assert!(result.mem_size > 0);
    assert!(result.data_len > 0);
    assert_eq!(result.fuel_consumed, None);
}

#[test]
#[ignore = "requires python wasm runtime"]
fn test_hello_world_with_fuel() {
    let executor = Executor::new(test_config().with_fuel(400_000_000)).unwrap();
    let result = executor.exec("print('Hello, world!')").unwrap();

    assert_eq!(result.text, "Hello, world!");
    assert!(result.mem_size > 0);
    assert!(result.data_len > 0);
    assert!(result.fuel_consumed.unwrap() > 0);
}

#[test]
#[ignore = "requires python wasm runtime"]
fn test_undefined_name_raises() {
    let executor = python();
    let err = guest_failure(executor.exec("undefined_function()"));

    assert_eq!(err.fault, FaultKind::Exit(1));
    assert!(err.stderr.contains("NameError"));
    assert!(!err.is_budget_exhausted());
}

#[test]
#[ignore = "requires python wasm runtime"]
fn test_large_output() {
    let executor = python();
    let result = executor.exec("print('A' * 1000000)").unwrap();
    assert_eq!(result.text.len(), 1_000_000);
}

#[test]
#[ignore = "requires python wasm runtime"]
fn test_multi_line_input() {
    let executor = python();
    let code = r#"
    a = 5
    for i in range(0, 10):
        print(i + a)
    "#;
    let result = executor.exec(code).unwrap();

    let expected: Vec<String> = (5..15).map(|i| i.to_string()).collect();
    assert_eq!(result.text, expected.join("\n"));
    assert!(result.mem_size > 0);
    assert!(result.data_len > 0);
    assert_eq!(result.fuel_consumed, None);
}

#[test]
#[ignore = "requires python wasm runtime"]
fn test_same_program_same_output() {
    let executor = python();
    let first = executor.exec("print(sum(range(100)))").unwrap();
    let second = executor.exec("print(sum(range(100)))").unwrap();
    assert_eq!(first.text, "4950");
    assert_eq!(first.text, second.text);
}

#[test]
#[ignore = "requires python wasm runtime"]
fn test_infinite_loop_exhausts_fuel() {
    let executor = Executor::new(test_config().with_fuel(50_000_000)).unwrap();
    let err = guest_failure(executor.exec("while True: pass"));
    assert_eq!(err.fault, FaultKind::FuelExhausted);
    assert!(err.is_budget_exhausted());
}

#[test]
#[ignore = "requires python wasm runtime"]
fn test_infinite_loop_hits_wall_time_limit() {
    let mut config = test_config();
    config.limits = ResourceLimits::new().with_wall_time_limit(1.0);
    let executor = Executor::new(config).unwrap();

    let err = guest_failure(executor.exec("while True: pass"));
    assert_eq!(err.fault, FaultKind::TimedOut);
}
