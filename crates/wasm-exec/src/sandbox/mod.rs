//! Per-run isolation
//!
//! Every run gets a fresh scratch directory holding the files its standard
//! streams are redirected into, and a WASI context that grants nothing beyond
//! those streams, the argument vector and explicitly configured environment.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

pub use crate::sandbox::environment::IsolationConfig;
pub use crate::sandbox::source::{dedent, program_text};

mod environment;
mod source;

/// Prefix of every scratch directory name
pub const SCRATCH_PREFIX: &str = "wasm-exec-";

const STDOUT_FILE: &str = "stdout.log";
const STDERR_FILE: &str = "stderr.log";

/// Host-side failures that prevent the isolation contract from being honoured
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to create scratch directory: {0}")]
    CreateDir(#[source] std::io::Error),

    #[error("failed to open stream file {path}: {source}")]
    OpenStream {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read stream file {path}: {source}")]
    ReadStream {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove scratch directory {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Scratch directory owned by a single run.
///
/// Removed when dropped. Prefer [`close()`](Self::close) on paths where a
/// removal failure should be reported rather than ignored.
#[derive(Debug)]
pub struct SandboxDir {
    dir: TempDir,
}

impl SandboxDir {
    /// Create a uniquely named scratch directory under `root`, or under the
    /// system temp directory when `root` is `None`
    pub fn create(root: Option<&Path>) -> Result<Self, SandboxError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);

        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(SandboxError::CreateDir)?;

        debug!(path = %dir.path().display(), "created scratch directory");
        Ok(Self { dir })
    }

    /// Get the path to the scratch directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Host path of the file the guest's stdout is written to
    pub fn stdout_path(&self) -> PathBuf {
        self.dir.path().join(STDOUT_FILE)
    }

    /// Host path of the file the guest's stderr is written to
    pub fn stderr_path(&self) -> PathBuf {
        self.dir.path().join(STDERR_FILE)
    }

    /// Read everything the guest wrote to stdout
    pub fn read_stdout(&self) -> Result<String, SandboxError> {
        read_stream(&self.stdout_path())
    }

    /// Read everything the guest wrote to stderr
    pub fn read_stderr(&self) -> Result<String, SandboxError> {
        read_stream(&self.stderr_path())
    }

    /// Remove the directory and everything in it
    pub fn close(self) -> Result<(), SandboxError> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|source| SandboxError::Remove { path: path.clone(), source })?;
        debug!(path = %path.display(), "removed scratch directory");
        Ok(())
    }
}

fn read_stream(path: &Path) -> Result<String, SandboxError> {
    let bytes = std::fs::read(path).map_err(|source| SandboxError::ReadStream {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
