//! Configuration file loading for wasm-exec
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError};

/// Prefix for environment variable overrides, e.g. `WASM_EXEC_USE_FUEL`
pub const ENV_PREFIX: &str = "WASM_EXEC";

impl Config {
    /// Load configuration from a file, layered with `WASM_EXEC_*` environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.use_fuel && self.fuel == 0 {
            return Err(ConfigError::Invalid(
                "fuel must be positive when use_fuel is enabled".to_owned(),
            ));
        }
        if self.program_args.is_empty() {
            return Err(ConfigError::Invalid("program_args is empty".to_owned()));
        }
        if let Some(ref digest) = self.runtime_sha256
            && !is_sha256_hex(digest)
        {
            return Err(ConfigError::Invalid(format!(
                "runtime_sha256 '{digest}' is not a 64-character hex digest"
            )));
        }
        if let Some(seconds) = self.limits.wall_time_limit
            && !(seconds.is_finite() && seconds > 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "wall_time_limit must be a positive number of seconds, got {seconds}"
            )));
        }
        if self.limits.memory_limit == Some(0) {
            return Err(ConfigError::Invalid("memory_limit must be positive".to_owned()));
        }
        for name in self.env.keys().chain(self.inherit_env.iter()) {
            if name.is_empty() || name.contains('=') || name.contains('\0') {
                return Err(ConfigError::Invalid(format!(
                    "invalid environment variable name '{name}'"
                )));
            }
        }

        Ok(())
    }
}

fn is_sha256_hex(digest: &str) -> bool {
    digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
}
