use wasm_exec::{Bindings, ExecRequest, HostValue};

use super::python;

#[test]
#[ignore = "requires python wasm runtime"]
fn test_global_binding_visible() {
    let executor = python();
    let request = ExecRequest::new("print(number * 10)").with_global("number", 10i64);
    assert_eq!(executor.exec_request(&request).unwrap().text, "100");
}

#[test]
#[ignore = "requires python wasm runtime"]
fn test_globals_and_locals_combined() {
    let executor = python();
    let mut globals = Bindings::new();
    globals.insert("NUMBER".to_owned(), HostValue::Int(10));
    let mut locals = Bindings::new();
    locals.insert("number".to_owned(), HostValue::Int(10));

    let result = executor
        .exec_with("print(NUMBER * number)", &globals, &locals)
        .unwrap();
    assert_eq!(result.text, "100");
}

#[test]
#[ignore = "requires python wasm runtime"]
fn test_local_wins_over_global() {
    let executor = python();
    let request = ExecRequest::new("print(number)")
        .with_global("number", 1i64)
        .with_local("number", 2i64);
    assert_eq!(executor.exec_request(&request).unwrap().text, "2");
}

#[test]
#[ignore = "requires python wasm runtime"]
fn test_float_binding_visible() {
    let executor = python();
    let request = ExecRequest::new("print(ratio * 4)").with_global("ratio", 0.5);
    assert_eq!(executor.exec_request(&request).unwrap().text, "2.0");
}
