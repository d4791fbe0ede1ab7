//! A library for running untrusted code inside a WebAssembly sandbox.
//!
//! wasm-exec loads a WASI build of an interpreter (CPython by default) into
//! wasmtime once and runs short programs against it. Each run is isolated: a
//! fresh store and linear memory, stdout and stderr captured into a private
//! scratch directory, no host filesystem, sockets or environment.
//!
//! # Features
//!
//! - **Instruction metering** with a per-run fuel budget; exhaustion is an error, never a hang.
//! - **Wall clock and memory limits** per run, overridable per request.
//! - **Host bindings** injected as wasm globals (`i32`, `f64`, `funcref`, `externref`).
//! - **TOML configuration** layered with `WASM_EXEC_*` environment variables.
//!
//! ```no_run
//! use wasm_exec::{ExecRequest, Executor};
//!
//! # fn main() -> Result<(), wasm_exec::ExecError> {
//! let executor = Executor::with_defaults()?;
//! let result = executor.exec_request(&ExecRequest::new("print(number * 10)").with_global("number", 10i64))?;
//! assert_eq!(result.text, "100");
//! # Ok(())
//! # }
//! ```

pub use bindings::{BINDINGS_NAMESPACE, Bindings, GlobalBindingError, HostFunc, HostValue};
pub use config::{Config, ConfigError, DEFAULT_RUNTIME_PATH, EXAMPLE_CONFIG};
pub use executor::{ExecError, ExecRequest, ExecutionError, Executor, FaultKind};
pub use runtime::{ModuleLoadError, verify_checksum};
pub use sandbox::SandboxError;
pub use types::{ExecResult, ResourceLimits, WASM_PAGE_SIZE};
pub use wasmtime::{Val, ValType};

pub mod bindings;
pub mod config;
pub mod executor;
pub mod runtime;
pub mod sandbox;
pub mod types;
