use serde::{Deserialize, Serialize};

/// Size of one WebAssembly linear memory page in bytes
pub const WASM_PAGE_SIZE: u64 = 64 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall clock time limit in seconds
    #[serde(default)]
    pub wall_time_limit: Option<f64>,

    /// Guest linear memory limit in kilobytes
    #[serde(default)]
    pub memory_limit: Option<u64>,
}

impl ResourceLimits {
    /// 1 kilobyte in kilobytes
    pub const KB: u64 = 1;
    /// 1 megabyte in kilobytes
    pub const MB: u64 = 1024;
    /// 1 gigabyte in kilobytes
    pub const GB: u64 = 1024 * 1024;

    /// Create new resource limits with all fields set to None
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wall clock time limit in seconds
    pub fn with_wall_time_limit(mut self, seconds: f64) -> Self {
        self.wall_time_limit = Some(seconds);
        self
    }

    /// Set the memory limit in kilobytes
    pub fn with_memory_limit(mut self, kb: u64) -> Self {
        self.memory_limit = Some(kb);
        self
    }

    /// Memory limit converted to bytes
    pub fn memory_limit_bytes(&self) -> Option<u64> {
        self.memory_limit.map(|kb| kb.saturating_mul(1024))
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            wall_time_limit: overrides.wall_time_limit.or(self.wall_time_limit),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
        }
    }
}

/// Result of a successful guest execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    /// Captured standard output with surrounding whitespace trimmed
    pub text: String,

    /// Final size of the guest's linear memory in WebAssembly pages
    pub mem_size: u64,

    /// Final size of the guest's linear memory in bytes
    pub data_len: u64,

    /// Fuel consumed by the run. `None` when metering is disabled, which is
    /// not the same as zero.
    pub fuel_consumed: Option<u64>,
}

impl ExecResult {
    pub(crate) fn new(
        output: &str,
        mem_size: u64,
        data_len: u64,
        fuel_consumed: Option<u64>,
    ) -> Self {
        Self {
            text: output.trim().to_owned(),
            mem_size,
            data_len,
            fuel_consumed,
        }
    }

    /// Whether instruction metering was active for this run
    #[must_use]
    pub fn is_metered(&self) -> bool {
        self.fuel_consumed.is_some()
    }
}
