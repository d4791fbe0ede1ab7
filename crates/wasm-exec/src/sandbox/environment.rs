//! Isolation configuration for a single run

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::{OutputFile, WasiCtxBuilder};

use crate::config::Config;
use crate::sandbox::{SandboxDir, SandboxError};

/// Everything a single guest run is granted.
///
/// Built fresh for every run and never mutated afterwards. The guest gets no
/// preopened directories, no sockets and no host environment beyond what is
/// listed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationConfig {
    argv: Vec<String>,
    env: Vec<(String, String)>,
    stdout: PathBuf,
    stderr: PathBuf,
}

impl IsolationConfig {
    /// Build the isolation configuration for running `program` with its
    /// streams redirected into `dir`
    pub fn new(config: &Config, program: String, dir: &SandboxDir) -> Self {
        let mut argv = config.program_args.clone();
        argv.push(program);

        let mut env: Vec<(String, String)> = config
            .env
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for key in &config.inherit_env {
            match std::env::var(key) {
                Ok(value) => env.push((key.clone(), value)),
                Err(_) => debug!(key, "inherited variable not set on host, skipping"),
            }
        }
        // Stable sort keeps explicit entries ahead of inherited ones
        env.sort_by(|a, b| a.0.cmp(&b.0));
        env.dedup_by(|a, b| a.0 == b.0);

        Self {
            argv,
            env,
            stdout: dir.stdout_path(),
            stderr: dir.stderr_path(),
        }
    }

    /// Get the guest argument vector
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Get the environment granted to the guest
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Host path receiving the guest's stdout
    pub fn stdout_path(&self) -> &Path {
        &self.stdout
    }

    /// Host path receiving the guest's stderr
    pub fn stderr_path(&self) -> &Path {
        &self.stderr
    }

    /// Create the stream files and build the WASI context for the run
    pub fn build_wasi(&self) -> Result<WasiP1Ctx, SandboxError> {
        let stdout = create_stream(&self.stdout)?;
        let stderr = create_stream(&self.stderr)?;

        let mut builder = WasiCtxBuilder::new();
        builder
            .args(&self.argv)
            .stdout(OutputFile::new(stdout))
            .stderr(OutputFile::new(stderr))
            .allow_tcp(false)
            .allow_udp(false)
            .allow_ip_name_lookup(false);
        for (key, value) in &self.env {
            builder.env(key, value);
        }

        debug!(
            argc = self.argv.len(),
            env = self.env.len(),
            "built isolation context"
        );
        Ok(builder.build_p1())
    }
}

fn create_stream(path: &Path) -> Result<File, SandboxError> {
    File::options()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| SandboxError::OpenStream {
            path: path.to_path_buf(),
            source,
        })
}
