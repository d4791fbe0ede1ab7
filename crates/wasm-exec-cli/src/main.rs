//! wasm-exec CLI
//!
//! A command-line tool for running code inside the WebAssembly interpreter sandbox.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;
use wasm_exec::{
    Config, EXAMPLE_CONFIG, ExecError, ExecRequest, Executor, HostValue, ResourceLimits,
    verify_checksum,
};

#[derive(Parser)]
#[command(name = "wasm-exec")]
#[command(about = "Run untrusted code inside a WebAssembly interpreter sandbox")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: wasm_exec.toml)
        #[arg(short, long, default_value = "wasm_exec.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a program in the sandbox
    Run {
        /// Source file to run ("-" or omitted reads stdin)
        #[arg(value_name = "FILE", conflicts_with = "eval")]
        source: Option<PathBuf>,

        /// Program text given on the command line
        #[arg(short, long, value_name = "CODE")]
        eval: Option<String>,

        /// Enable metering with this instruction budget
        #[arg(short, long)]
        fuel: Option<u64>,

        /// Bind a number in the program, e.g. --set number=10 (repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_binding)]
        bindings: Vec<(String, HostValue)>,

        /// Wall clock limit in seconds
        #[arg(short, long)]
        timeout: Option<f64>,

        /// Guest memory limit in KB
        #[arg(short, long)]
        memory_limit: Option<u64>,

        /// Guest runtime module (overrides the configured one)
        #[arg(long)]
        runtime: Option<PathBuf>,
    },

    /// Show the effective configuration
    ShowConfig,

    /// Check a guest runtime module against a SHA-256 digest
    VerifyRuntime {
        /// Module to check (default: the configured runtime)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,

        /// Expected digest as hex
        #[arg(long)]
        sha256: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            eval,
            fuel,
            bindings,
            timeout,
            memory_limit,
            runtime,
        } => {
            let code = read_source(source.as_deref(), eval).await?;
            let mut config = config;
            if let Some(fuel) = fuel {
                config = config.with_fuel(fuel);
            }
            if let Some(runtime) = runtime {
                config = config.with_runtime_path(runtime);
            }

            let mut request = ExecRequest::new(code);
            for (name, value) in bindings {
                request = request.with_global(name, value);
            }
            // Only include explicitly-specified limits so they don't override
            // the configured defaults
            if timeout.is_some() || memory_limit.is_some() {
                request = request.with_limits(ResourceLimits {
                    wall_time_limit: timeout,
                    memory_limit,
                });
            }

            run_program(config, request).await
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
        Commands::VerifyRuntime { path, sha256 } => {
            let path = path.unwrap_or_else(|| config.runtime_path());
            verify_runtime(&path, &sha256)
        }
    }
}

async fn read_source(source: Option<&Path>, eval: Option<String>) -> Result<String> {
    if let Some(code) = eval {
        return Ok(code);
    }

    match source {
        Some(path) if path != Path::new("-") => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read source file '{}'", path.display())),
        _ => {
            let mut code = String::new();
            tokio::io::stdin()
                .read_to_string(&mut code)
                .await
                .context("failed to read source from stdin")?;
            Ok(code)
        }
    }
}

async fn run_program(config: Config, request: ExecRequest) -> Result<()> {
    info!(runtime = %config.runtime_path().display(), "loading guest runtime");

    // Compiling the runtime is CPU bound; keep it off the async workers
    let executor = tokio::task::spawn_blocking(move || Executor::new(config))
        .await
        .context("runtime loading task failed")?
        .context("failed to load guest runtime")?;

    match executor.exec_async(request).await {
        Ok(result) => {
            println!("{}", result.text);
            // Log execution info via tracing (stderr), keeping stdout clean for piping
            info!(
                mem_size = result.mem_size,
                data_len = result.data_len,
                fuel_consumed = ?result.fuel_consumed,
                "execution result"
            );
            Ok(())
        }
        Err(ExecError::Execution(e)) => {
            eprint!("{}", e.stderr);
            if e.is_budget_exhausted() {
                warn!(fault = %e.fault, "guest stopped by resource budget");
            } else {
                info!(fault = %e.fault, "guest failed");
            }
            std::process::exit(1);
        }
        Err(e) => Err(e).context("execution failed"),
    }
}

fn show_config(config: &Config) {
    println!("Guest runtime: {}", config.runtime_path().display());
    match &config.runtime_sha256 {
        Some(digest) => println!("  Pinned SHA-256: {digest}"),
        None => println!("  Pinned SHA-256: none"),
    }
    println!("  Compilation cache: {}", config.cache);
    println!("  Program args: {:?}", config.program_args);
    println!();
    println!("Metering: {}", config.use_fuel);
    println!("  Fuel budget: {}", config.fuel);
    println!();
    println!("Default resource limits:");
    println!("  Wall time limit: {:?}", config.limits.wall_time_limit);
    println!("  Memory limit: {:?} KB", config.limits.memory_limit);
    println!();
    println!("Bindings:");
    println!("  Prelude: {}", config.prelude);
    println!("  Allow opaque: {}", config.allow_opaque);
    println!();

    let mut env: Vec<_> = config.env.keys().collect();
    env.sort();
    println!("Environment granted: {env:?}");
    println!("Environment inherited: {:?}", config.inherit_env);
    match &config.temp_root {
        Some(root) => println!("Scratch root: {}", root.display()),
        None => println!("Scratch root: system temp directory"),
    }
}

fn verify_runtime(path: &Path, expected: &str) -> Result<()> {
    let digest = verify_checksum(path, expected)
        .with_context(|| format!("runtime at '{}' failed verification", path.display()))?;
    println!("{}  {}", digest, path.display());
    Ok(())
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}

/// Parse `NAME=VALUE` where VALUE is an integer or a float
fn parse_binding(arg: &str) -> Result<(String, HostValue), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{arg}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing binding name in '{arg}'"));
    }

    let value = value.trim();
    let value = if let Ok(int) = value.parse::<i64>() {
        HostValue::Int(int)
    } else if let Ok(float) = value.parse::<f64>() {
        HostValue::Float(float)
    } else {
        return Err(format!("'{value}' is not a number"));
    };
    Ok((name.to_owned(), value))
}
