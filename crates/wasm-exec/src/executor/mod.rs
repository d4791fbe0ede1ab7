//! Sandboxed execution of guest programs
//!
//! An [`Executor`] compiles the guest interpreter once and then runs any number
//! of programs against it. Every run gets its own store, scratch directory and
//! binding set; the engine, module and base linker are shared read-only.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};
use wasmtime::{Engine, Linker};
use wasmtime_wasi::preview1;

use crate::bindings::{self, Bindings, GlobalBindingError, HostValue};
use crate::config::{Config, ConfigError};
use crate::runtime::{EpochTicker, GuestModule, ModuleLoadError, build_engine};
use crate::sandbox::{IsolationConfig, SandboxDir, SandboxError, program_text};
use crate::types::{ExecResult, ResourceLimits};

use crate::executor::invoke::SessionState;

mod extract;
mod invoke;

/// Why a guest run stopped before completing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// The guest called `proc_exit` with a non-zero status
    Exit(i32),
    /// A wasm trap, including errors raised by host callbacks
    Trap(String),
    /// The instruction budget ran out
    FuelExhausted,
    /// The wall clock limit was reached
    TimedOut,
    /// The guest's initial linear memory is larger than the memory limit
    MemoryLimit,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit(code) => write!(f, "exit status {code}"),
            Self::Trap(message) => write!(f, "trap: {message}"),
            Self::FuelExhausted => f.write_str("fuel exhausted"),
            Self::TimedOut => f.write_str("wall time limit exceeded"),
            Self::MemoryLimit => f.write_str("memory limit exceeded"),
        }
    }
}

/// A guest run that failed, with whatever it wrote to stderr
#[derive(Debug, Error)]
#[error("guest execution failed ({fault}): {}", .stderr.trim_end())]
pub struct ExecutionError {
    /// Captured standard error, unmodified
    pub stderr: String,
    pub fault: FaultKind,
}

impl ExecutionError {
    /// Whether the run was stopped by its fuel budget or wall clock limit
    /// rather than failing on its own
    #[must_use]
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self.fault, FaultKind::FuelExhausted | FaultKind::TimedOut)
    }
}

/// Errors returned by [`Executor`]
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("module load error: {0}")]
    ModuleLoad(#[from] ModuleLoadError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("binding error: {0}")]
    Binding(#[from] GlobalBindingError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("wasm runtime error: {0:#}")]
    Runtime(#[source] wasmtime::Error),

    #[error("execution task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ExecError {
    /// The guest failure, if this error is one
    pub fn as_execution(&self) -> Option<&ExecutionError> {
        match self {
            Self::Execution(e) => Some(e),
            _ => None,
        }
    }
}

/// A single program to run
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    /// Program source; common indentation is removed before running
    pub source: String,
    pub globals: Bindings,
    /// Bindings that replace same-named globals
    pub locals: Bindings,
    /// Fuel budget for this run instead of the configured one
    pub fuel: Option<u64>,
    /// Limits merged over the configured defaults
    pub limits: Option<ResourceLimits>,
}

impl ExecRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn with_global(mut self, name: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    pub fn with_local(mut self, name: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.locals.insert(name.into(), value.into());
        self
    }

    pub fn with_globals(mut self, globals: Bindings) -> Self {
        self.globals = globals;
        self
    }

    pub fn with_locals(mut self, locals: Bindings) -> Self {
        self.locals = locals;
        self
    }

    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = Some(fuel);
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// Runs programs inside the sandboxed guest interpreter.
///
/// Cheap to clone; clones share the compiled module and the epoch ticker.
#[derive(Clone)]
pub struct Executor {
    config: Arc<Config>,
    engine: Engine,
    guest: GuestModule,
    linker: Arc<Linker<SessionState>>,
    _ticker: Arc<EpochTicker>,
}

impl Executor {
    /// Create an executor, loading the guest module named by `config`
    #[instrument(skip(config), fields(runtime = %config.runtime_path().display()))]
    pub fn new(config: Config) -> Result<Self, ExecError> {
        config.validate()?;
        let engine = build_engine(&config)?;
        let guest = GuestModule::from_file(
            &engine,
            &config.runtime_path(),
            config.runtime_sha256.as_deref(),
        )?;
        Self::assemble(config, engine, guest)
    }

    /// Create an executor with the embedded default configuration
    pub fn with_defaults() -> Result<Self, ExecError> {
        Self::new(Config::default())
    }

    /// Create an executor from an in-memory guest module.
    ///
    /// `runtime_path` and `runtime_sha256` in `config` are not used.
    #[instrument(skip(config, bytes), fields(len = bytes.len()))]
    pub fn from_bytes(config: Config, bytes: &[u8]) -> Result<Self, ExecError> {
        config.validate()?;
        let engine = build_engine(&config)?;
        let guest = GuestModule::from_bytes(&engine, bytes)?;
        Self::assemble(config, engine, guest)
    }

    fn assemble(config: Config, engine: Engine, guest: GuestModule) -> Result<Self, ExecError> {
        let mut linker = Linker::new(&engine);
        preview1::add_to_linker_sync(&mut linker, |state: &mut SessionState| &mut state.wasi)
            .map_err(ExecError::Runtime)?;
        let ticker = EpochTicker::spawn(engine.clone())?;

        debug!(use_fuel = config.use_fuel, "executor ready");
        Ok(Self {
            config: Arc::new(config),
            engine,
            guest,
            linker: Arc::new(linker),
            _ticker: Arc::new(ticker),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the loaded guest module
    pub fn guest(&self) -> &GuestModule {
        &self.guest
    }

    /// Whether runs are metered
    pub fn uses_fuel(&self) -> bool {
        self.config.use_fuel
    }

    /// Run `source` with no bindings
    pub fn exec(&self, source: &str) -> Result<ExecResult, ExecError> {
        self.exec_request(&ExecRequest::new(source))
    }

    /// Run `source` with the given bindings; `locals` win over `globals`
    pub fn exec_with(
        &self,
        source: &str,
        globals: &Bindings,
        locals: &Bindings,
    ) -> Result<ExecResult, ExecError> {
        let request = ExecRequest::new(source)
            .with_globals(globals.clone())
            .with_locals(locals.clone());
        self.exec_request(&request)
    }

    /// Run a request, blocking the calling thread until the guest finishes
    #[instrument(skip_all, fields(source_len = request.source.len()))]
    pub fn exec_request(&self, request: &ExecRequest) -> Result<ExecResult, ExecError> {
        let bindings =
            bindings::resolve(&request.globals, &request.locals, self.config.allow_opaque)?;
        let prelude = if self.config.prelude {
            bindings::render_prelude(&bindings)
        } else {
            String::new()
        };
        let program = program_text(&request.source, &prelude);
        let limits = self.config.effective_limits(request.limits.as_ref());
        let fuel = self.fuel_for(request);

        let dir = SandboxDir::create(self.config.temp_root.as_deref())?;
        let isolation = IsolationConfig::new(&self.config, program, &dir);
        let outcome = invoke::run(
            &self.engine,
            self.guest.module(),
            &self.linker,
            &isolation,
            &bindings,
            fuel,
            &limits,
        );
        let result = extract::finish(dir, outcome);

        match &result {
            Ok(r) => debug!(
                output_len = r.text.len(),
                mem_size = r.mem_size,
                fuel_consumed = ?r.fuel_consumed,
                "execution complete"
            ),
            Err(e) => debug!("execution failed: {e}"),
        }
        result
    }

    /// Run a request on the blocking thread pool
    pub async fn exec_async(&self, request: ExecRequest) -> Result<ExecResult, ExecError> {
        let executor = self.clone();
        tokio::task::spawn_blocking(move || executor.exec_request(&request)).await?
    }

    fn fuel_for(&self, request: &ExecRequest) -> Option<u64> {
        match (self.config.fuel_budget(), request.fuel) {
            (Some(_), Some(fuel)) => Some(fuel),
            (Some(budget), None) => Some(budget),
            (None, Some(_)) => {
                warn!("fuel requested but metering is disabled, ignoring");
                None
            }
            (None, None) => None,
        }
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("guest", &self.guest.path())
            .finish_non_exhaustive()
    }
}
