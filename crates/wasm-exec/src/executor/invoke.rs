//! Running one guest session to completion

use tracing::{debug, instrument};
use wasmtime::{
    Engine, ExternType, Linker, Module, Store, StoreLimits, StoreLimitsBuilder, Trap,
};
use wasmtime_wasi::I32Exit;
use wasmtime_wasi::preview1::WasiP1Ctx;

use crate::bindings::{self, Binding};
use crate::executor::{ExecError, FaultKind};
use crate::runtime::{ENTRY_POINT, MEMORY_EXPORT, deadline_ticks};
use crate::sandbox::IsolationConfig;
use crate::types::{ResourceLimits, WASM_PAGE_SIZE};

/// Host state owned by a single store
pub(crate) struct SessionState {
    pub(crate) wasi: WasiP1Ctx,
    limits: StoreLimits,
}

/// Measurements taken after a run returned normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Metrics {
    pub(crate) mem_size: u64,
    pub(crate) data_len: u64,
    pub(crate) fuel_consumed: Option<u64>,
}

/// How a session ended, before it is turned into a public result
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed(Metrics),
    Faulted(FaultKind),
}

/// Instantiate the guest in a fresh store and run its entry point.
///
/// The store, and with it every stream handle the guest held, is dropped
/// before this returns.
#[instrument(skip_all, fields(bindings = bindings.len(), fuel = ?fuel))]
pub(crate) fn run(
    engine: &Engine,
    module: &Module,
    base: &Linker<SessionState>,
    isolation: &IsolationConfig,
    bindings: &[Binding],
    fuel: Option<u64>,
    limits: &ResourceLimits,
) -> Result<Outcome, ExecError> {
    let wasi = isolation.build_wasi()?;

    if let (Some(limit), Some(initial)) = (limits.memory_limit_bytes(), initial_memory(module))
        && initial > limit
    {
        debug!(initial, limit, "guest memory starts above the limit");
        return Ok(Outcome::Faulted(FaultKind::MemoryLimit));
    }

    let mut store_limits = StoreLimitsBuilder::new();
    if let Some(bytes) = limits.memory_limit_bytes() {
        store_limits = store_limits.memory_size(usize::try_from(bytes).unwrap_or(usize::MAX));
    }
    let mut store = Store::new(
        engine,
        SessionState {
            wasi,
            limits: store_limits.build(),
        },
    );
    store.limiter(|state| &mut state.limits);
    store.set_epoch_deadline(deadline_ticks(limits.wall_time_limit));
    if let Some(budget) = fuel {
        store.set_fuel(budget).map_err(ExecError::Runtime)?;
    }

    let mut linker = base.clone();
    bindings::inject(&mut store, &mut linker, bindings)?;

    let instance = match linker.instantiate(&mut store, module) {
        Ok(instance) => instance,
        Err(error) => {
            return match guest_fault(&error) {
                Some(fault) => {
                    debug!(%fault, "guest faulted during instantiation");
                    Ok(Outcome::Faulted(fault))
                }
                None => Err(ExecError::Runtime(error)),
            };
        }
    };

    let start = instance
        .get_typed_func::<(), ()>(&mut store, ENTRY_POINT)
        .map_err(ExecError::Runtime)?;

    match start.call(&mut store, ()) {
        Ok(()) => {}
        Err(error) => match guest_fault(&error) {
            Some(FaultKind::Exit(0)) => debug!("guest exited with status 0"),
            Some(fault) => {
                debug!(%fault, "guest faulted");
                return Ok(Outcome::Faulted(fault));
            }
            None => {
                // Errors raised by host callbacks abort the guest like a trap.
                let fault = FaultKind::Trap(format!("{error:#}"));
                debug!(%fault, "guest aborted by host error");
                return Ok(Outcome::Faulted(fault));
            }
        },
    }

    let memory = instance
        .get_memory(&mut store, MEMORY_EXPORT)
        .ok_or_else(|| {
            ExecError::Runtime(wasmtime::Error::msg(format!(
                "guest instance has no `{MEMORY_EXPORT}` export"
            )))
        })?;

    let fuel_consumed = match fuel {
        Some(budget) => {
            let remaining = store.get_fuel().map_err(ExecError::Runtime)?;
            Some(budget.saturating_sub(remaining))
        }
        None => None,
    };

    let metrics = Metrics {
        mem_size: memory.size(&store),
        data_len: memory.data_size(&store) as u64,
        fuel_consumed,
    };
    debug!(?metrics, "guest completed");
    Ok(Outcome::Completed(metrics))
}

/// Bytes of linear memory the guest starts with
fn initial_memory(module: &Module) -> Option<u64> {
    match module.get_export(MEMORY_EXPORT) {
        Some(ExternType::Memory(ty)) => Some(ty.minimum().saturating_mul(WASM_PAGE_SIZE)),
        _ => None,
    }
}

/// Recognise errors that mean the guest itself stopped: an explicit exit or
/// a wasm trap
fn guest_fault(error: &wasmtime::Error) -> Option<FaultKind> {
    if let Some(exit) = error.downcast_ref::<I32Exit>() {
        return Some(FaultKind::Exit(exit.0));
    }
    error.downcast_ref::<Trap>().map(|trap| match trap {
        Trap::OutOfFuel => FaultKind::FuelExhausted,
        Trap::Interrupt => FaultKind::TimedOut,
        other => FaultKind::Trap(other.to_string()),
    })
}
