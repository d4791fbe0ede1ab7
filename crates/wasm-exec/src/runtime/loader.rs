//! Guest module loading and validation

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use wasmtime::{Engine, ExternType, Module};

use crate::runtime::{ENTRY_POINT, MEMORY_EXPORT, ModuleLoadError};

/// A compiled guest interpreter module.
///
/// Cheap to clone; clones share the same compiled code.
#[derive(Debug, Clone)]
pub struct GuestModule {
    module: Module,
    path: Option<PathBuf>,
}

impl GuestModule {
    /// Load and compile a guest module from disk.
    ///
    /// When `expected_sha256` is given the artifact bytes are checked against
    /// it before compilation.
    #[instrument(skip(engine))]
    pub fn from_file(
        engine: &Engine,
        path: &Path,
        expected_sha256: Option<&str>,
    ) -> Result<Self, ModuleLoadError> {
        let bytes = read_artifact(path)?;

        if let Some(expected) = expected_sha256 {
            check_digest(&bytes, expected)?;
            debug!("guest module checksum verified");
        }

        let mut guest = Self::from_bytes(engine, &bytes)?;
        guest.path = Some(path.to_path_buf());
        Ok(guest)
    }

    /// Compile a guest module from an in-memory WebAssembly binary
    #[instrument(skip(engine, bytes), fields(len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, ModuleLoadError> {
        let module = Module::from_binary(engine, bytes).map_err(ModuleLoadError::Invalid)?;
        validate_exports(&module)?;

        debug!(
            imports = module.imports().len(),
            exports = module.exports().len(),
            "guest module compiled"
        );

        Ok(Self { module, path: None })
    }

    /// Get the compiled module
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Get the path the module was loaded from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Check that a guest module at `path` has the given SHA-256 digest.
///
/// Returns the actual digest as lowercase hex.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<String, ModuleLoadError> {
    let bytes = read_artifact(path)?;
    check_digest(&bytes, expected)
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, ModuleLoadError> {
    if !path.exists() {
        return Err(ModuleLoadError::NotFound(path.to_path_buf()));
    }
    std::fs::read(path).map_err(|source| ModuleLoadError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn check_digest(bytes: &[u8], expected: &str) -> Result<String, ModuleLoadError> {
    let actual = hex::encode(Sha256::digest(bytes));
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(ModuleLoadError::ChecksumMismatch {
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        });
    }
    Ok(actual)
}

/// The guest must follow the WASI command ABI: a `_start` function taking and
/// returning nothing, and an exported linear memory.
fn validate_exports(module: &Module) -> Result<(), ModuleLoadError> {
    match module.get_export(ENTRY_POINT) {
        Some(ExternType::Func(ty)) if ty.params().len() == 0 && ty.results().len() == 0 => {}
        _ => {
            return Err(ModuleLoadError::MissingExport(format!(
                "function `{ENTRY_POINT}: () -> ()`"
            )));
        }
    }

    match module.get_export(MEMORY_EXPORT) {
        Some(ExternType::Memory(_)) => Ok(()),
        _ => Err(ModuleLoadError::MissingExport(format!(
            "memory `{MEMORY_EXPORT}`"
        ))),
    }
}
