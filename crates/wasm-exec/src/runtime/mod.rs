//! Guest module runtime
//!
//! Builds the wasmtime engine shared by every run and loads the guest
//! interpreter module into it. The engine and the compiled module are the only
//! state shared between concurrent executions; both are immutable once built.

use std::path::PathBuf;

use thiserror::Error;

pub use crate::runtime::engine::{EPOCH_TICK, EpochTicker, build_engine, deadline_ticks};
pub use crate::runtime::loader::{GuestModule, verify_checksum};

mod engine;
mod loader;

/// Export the guest must provide as its program entry point
pub const ENTRY_POINT: &str = "_start";

/// Export holding the guest's linear memory
pub const MEMORY_EXPORT: &str = "memory";

/// Errors that occur while preparing the engine or loading the guest module
#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("guest module not found at {0}")]
    NotFound(PathBuf),

    #[error("failed to read guest module at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("guest module checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("invalid guest module: {0}")]
    Invalid(#[source] wasmtime::Error),

    #[error("guest module does not export {0}")]
    MissingExport(String),

    #[error("failed to configure wasm engine: {0}")]
    Engine(#[source] wasmtime::Error),

    #[error("failed to start epoch ticker: {0}")]
    Ticker(#[source] std::io::Error),
}
