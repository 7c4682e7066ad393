//! magert - inspect mage runtime settings and run commands under the
//! shared execution context
//!
//! The execution context is acquired before any command runs, so a
//! malformed `MAGEFILE_TIMEOUT` always stops the process with status 1.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mage_runtime::config::EnvironmentConfig;
use mage_runtime::context::ExecutionContext;
use mage_runtime::logging::{format_duration, log_level};
use mage_runtime::RuntimeError;
use std::process::ExitCode;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "magert")]
#[command(about = "Inspect mage runtime settings and run commands bounded by MAGEFILE_TIMEOUT", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved runtime settings
    Env {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the directory where compiled binaries are cached
    CacheDir,

    /// Run a command, killing it if the run is cancelled or times out
    Run {
        /// Program and its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = EnvironmentConfig::from_process();

    tracing_subscriber::fmt()
        .with_max_level(log_level(&config))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (ctx, cancel) = match mage_runtime::context() {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("timeout error: {:#}", anyhow::Error::new(e));
            return ExitCode::FAILURE;
        }
    };
    let _guard = cancel.guard();

    match execute(cli.command, &config, &ctx).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(
    command: Commands,
    config: &EnvironmentConfig,
    ctx: &ExecutionContext,
) -> Result<ExitCode> {
    match command {
        Commands::Env { json } => {
            let settings = config.settings();
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                println!("verbose:   {}", settings.verbose);
                println!("debug:     {}", settings.debug);
                println!("cache_dir: {}", settings.cache_dir.display());
                match ctx.remaining() {
                    Some(left) => println!(
                        "timeout:   {} ({} left)",
                        settings.timeout.as_deref().unwrap_or_default(),
                        format_duration(left)
                    ),
                    None => println!("timeout:   none"),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::CacheDir => {
            println!("{}", config.cache_dir().display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { command } => run_bounded(&command, ctx).await,
    }
}

async fn run_bounded(command: &[String], ctx: &ExecutionContext) -> Result<ExitCode> {
    let (program, args) = command
        .split_first()
        .context("No command given")?;

    info!("Running {}", command.join(" "));

    let mut child = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start {}", program))?;

    let outcome = ctx.run(child.wait()).await;
    match outcome {
        Ok(status) => {
            let status = status.with_context(|| format!("Failed to wait for {}", program))?;
            debug!("{} exited with {}", program, status);
            let code = status.code().unwrap_or(1);
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
        Err(RuntimeError::Done(reason)) => {
            warn!("Stopping {}: {}", program, reason);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {}", program, e);
            }
            eprintln!("magert: {}: {}", program, reason);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}
