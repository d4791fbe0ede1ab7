//! Executor tests against small hand-written guests
//!
//! The guests under tests/fixtures/guests are WAT modules that follow the same
//! WASI command ABI as the CPython runtime, so the whole execution path runs
//! without needing the real interpreter.

use wasm_exec::{Config, Executor};

mod cleanup;
mod faults;
mod output;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Compile a guest fixture to a wasm binary
pub(crate) fn guest_bytes(name: &str) -> Vec<u8> {
    let path = format!("{FIXTURES_PATH}/guests/{name}");
    wat::parse_file(&path).unwrap_or_else(|e| panic!("Failed to parse guest {path}: {e}"))
}

/// Default config without the on-disk compilation cache
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.cache = false;
    config
}

pub(crate) fn executor(name: &str) -> Executor {
    executor_with(name, test_config())
}

pub(crate) fn executor_with(name: &str, config: Config) -> Executor {
    Executor::from_bytes(config, &guest_bytes(name)).expect("Failed to create executor")
}
