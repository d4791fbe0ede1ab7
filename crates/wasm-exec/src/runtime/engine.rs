//! Engine construction and epoch-based wall clock limiting

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, instrument, warn};
use wasmtime::Engine;

use crate::config::Config;
use crate::runtime::ModuleLoadError;

/// Interval between engine epoch increments
pub const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Deadline for runs without a wall clock limit. Far enough away that the
/// ticker never reaches it, small enough that adding the current epoch cannot
/// overflow.
const NO_DEADLINE: u64 = u64::MAX / 2;

/// Build the engine shared by all runs of an executor.
///
/// Epoch interruption is always on so that a per-request wall clock limit can
/// be honoured without rebuilding the engine; runs without a limit get a
/// deadline that never arrives.
#[instrument(skip(config), fields(use_fuel = config.use_fuel, cache = config.cache))]
pub fn build_engine(config: &Config) -> Result<Engine, ModuleLoadError> {
    let mut wasm_config = wasmtime::Config::new();
    wasm_config
        .consume_fuel(config.use_fuel)
        .epoch_interruption(true);

    if config.cache
        && let Err(e) = wasm_config.cache_config_load_default()
    {
        warn!("compilation cache unavailable: {e:#}, continuing without it");
    }

    let engine = Engine::new(&wasm_config).map_err(ModuleLoadError::Engine)?;
    debug!("wasm engine ready");
    Ok(engine)
}

/// Number of epoch ticks a run may take before it is interrupted
pub fn deadline_ticks(wall_time_limit: Option<f64>) -> u64 {
    match wall_time_limit {
        Some(seconds) => {
            let ticks = (seconds / EPOCH_TICK.as_secs_f64()).ceil();
            if ticks.is_finite() && ticks < NO_DEADLINE as f64 {
                (ticks as u64).max(1)
            } else {
                NO_DEADLINE
            }
        }
        None => NO_DEADLINE,
    }
}

/// Background thread advancing the engine epoch every [`EPOCH_TICK`].
///
/// Stops and joins on drop.
#[derive(Debug)]
pub struct EpochTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EpochTicker {
    /// Start ticking the given engine
    pub fn spawn(engine: Engine) -> Result<Self, ModuleLoadError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("wasm-exec-epoch".to_owned())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    std::thread::sleep(EPOCH_TICK);
                    engine.increment_epoch();
                }
            })
            .map_err(ModuleLoadError::Ticker)?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("epoch ticker thread panicked");
        }
    }
}
