use wasm_exec::{ExecRequest, WASM_PAGE_SIZE};

use super::{executor, executor_with, test_config};

#[test]
fn test_program_text_reaches_guest() {
    let executor = executor("echo.wat");
    let result = executor.exec("print('Hello, world!')").unwrap();
    assert_eq!(result.text, "print('Hello, world!')");
}

#[test]
fn test_source_is_dedented() {
    let executor = executor("echo.wat");
    let source = r#"
        a = 5
        for i in range(0, 10):
            print(i + a)
    "#;
    let result = executor.exec(source).unwrap();
    assert_eq!(result.text, "a = 5\nfor i in range(0, 10):\n    print(i + a)");
}

#[test]
fn test_output_is_repeatable() {
    let executor = executor("echo.wat");
    let first = executor.exec("print('same')").unwrap();
    let second = executor.exec("print('same')").unwrap();
    assert_eq!(first.text, second.text);
}

#[test]
fn test_memory_metrics_reported() {
    let executor = executor("echo.wat");
    let result = executor.exec("x").unwrap();
    assert!(result.mem_size > 0);
    assert!(result.data_len > 0);
    assert_eq!(result.data_len, result.mem_size * WASM_PAGE_SIZE);
}

#[test]
fn test_large_output() {
    let executor = executor("echo.wat");
    let source = "x".repeat(1_000_000);
    let result = executor.exec(&source).unwrap();
    assert_eq!(result.text.len(), 1_000_000);
    assert!(result.text.chars().all(|c| c == 'x'));
    // The argument alone needs more than the initial two pages
    assert!(result.mem_size > 2);
}

#[test]
fn test_fuel_absent_without_metering() {
    let executor = executor("echo.wat");
    let result = executor.exec("print(1)").unwrap();
    assert_eq!(result.fuel_consumed, None);
    assert!(!result.is_metered());
}

#[test]
fn test_fuel_reported_with_metering() {
    let executor = executor_with("echo.wat", test_config().with_fuel(10_000_000));
    let result = executor.exec("print(1)").unwrap();
    let consumed = result.fuel_consumed.expect("metered run should report fuel");
    assert!(consumed > 0);
    assert!(consumed < 10_000_000);
}

#[test]
fn test_fuel_grows_with_work() {
    let executor = executor_with("echo.wat", test_config().with_fuel(100_000_000));
    let short = executor.exec("x").unwrap().fuel_consumed.unwrap();
    let long = executor.exec(&"x".repeat(10_000)).unwrap().fuel_consumed.unwrap();
    assert!(long > short);
}

#[test]
fn test_numeric_bindings_prepended() {
    let executor = executor("echo.wat");
    let request = ExecRequest::new("print(number * 10)")
        .with_global("number", 10i64)
        .with_global("ratio", 0.5);
    let result = executor.exec_request(&request).unwrap();
    assert_eq!(result.text, "number = 10\nratio = 0.5\nprint(number * 10)");
}

#[test]
fn test_prelude_can_be_disabled() {
    let mut config = test_config();
    config.prelude = false;
    let executor = executor_with("echo.wat", config);
    let request = ExecRequest::new("print(number)").with_global("number", 10i64);
    let result = executor.exec_request(&request).unwrap();
    assert_eq!(result.text, "print(number)");
}

#[test]
fn test_custom_program_args() {
    let mut config = test_config();
    config.program_args = vec!["python".to_owned(), "-I".to_owned(), "-c".to_owned()];
    let executor = executor_with("echo.wat", config);
    let result = executor.exec("print(2)").unwrap();
    assert_eq!(result.text, "print(2)");
}

#[test]
fn test_proc_exit_zero_is_success() {
    let executor = executor("exit_zero.wat");
    let result = executor.exec("").unwrap();
    assert_eq!(result.text, "done");
    assert_eq!(result.mem_size, 1);
}
