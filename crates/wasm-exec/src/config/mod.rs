use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::types::ResourceLimits;

pub use crate::config::loader::ENV_PREFIX;

mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../wasm_exec.example.toml");

/// Bundled location of the CPython WASI runtime.
pub const DEFAULT_RUNTIME_PATH: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/wasm_runtime/python-3.11.3.wasm"
);

/// Default instruction budget when metering is enabled.
pub const DEFAULT_FUEL: u64 = 400_000_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for an [`Executor`](crate::Executor)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Enable instruction metering.
    #[serde(default)]
    pub use_fuel: bool,

    /// Instruction budget per run when metering is enabled.
    #[serde(default = "default_fuel")]
    pub fuel: u64,

    /// Path to the guest interpreter module (uses the bundled runtime if not specified).
    #[serde(default)]
    pub runtime_path: Option<PathBuf>,

    /// Expected SHA-256 of the guest module, as hex.
    #[serde(default)]
    pub runtime_sha256: Option<String>,

    /// Use the wasmtime compilation cache.
    #[serde(default = "default_true")]
    pub cache: bool,

    /// Argument vector prefix; the program text is appended as the final argument.
    #[serde(default = "default_program_args")]
    pub program_args: Vec<String>,

    /// Environment variables granted to the guest
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Host environment variables passed through to the guest by name
    #[serde(default)]
    pub inherit_env: Vec<String>,

    /// Map bindings with no numeric or callable representation to extern references.
    #[serde(default = "default_true")]
    pub allow_opaque: bool,

    /// Render numeric bindings as assignments ahead of the program text.
    ///
    /// An interpreter guest looks names up in its own namespace, not in wasm
    /// imports, so this is what makes `number` visible to `print(number)`.
    /// The assignments go after any leading `__future__` imports. Traceback
    /// line numbers past that point are offset by one per rendered binding.
    #[serde(default = "default_true")]
    pub prelude: bool,

    /// Default resource limits applied to all executions.
    /// This will be overridden if the execution request specifies different limits
    #[serde(default)]
    pub limits: ResourceLimits,

    /// Parent directory for per-run scratch directories.
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
}

impl Config {
    /// Create a new config with the embedded defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable metering with the given budget
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.use_fuel = true;
        self.fuel = fuel;
        self
    }

    /// Use a specific guest module
    pub fn with_runtime_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.runtime_path = Some(path.into());
        self
    }

    /// Get the path to the guest module
    pub fn runtime_path(&self) -> PathBuf {
        self.runtime_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RUNTIME_PATH))
    }

    /// Budget to pre-charge each run with, if metering is enabled
    pub fn fuel_budget(&self) -> Option<u64> {
        self.use_fuel.then_some(self.fuel)
    }

    /// Merge resource limits with defaults
    pub fn effective_limits(&self, overrides: Option<&ResourceLimits>) -> ResourceLimits {
        match overrides {
            Some(limits) => self.limits.with_overrides(limits),
            None => self.limits.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_fuel() -> u64 {
    DEFAULT_FUEL
}

fn default_true() -> bool {
    true
}

fn default_program_args() -> Vec<String> {
    vec!["python".to_owned(), "-c".to_owned()]
}
