//! nfio binary
//!
//! Presents NFV orchestration state as a filesystem.
//!
//! ## Usage
//!
//! ```bash
//! # Validate a catalog file and print the resulting type schemas
//! nfio check-config catalog.toml
//!
//! # Interactive shell over the simulated orchestrator
//! nfio shell [--config catalog.toml]
//! ```

mod constants;
mod shell;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use nfio_kernel::{MemoryOrchestrator, NfEngine, NfioConfig};

use crate::constants::DEFAULT_LOG_FILTER;
use crate::shell::Shell;

#[derive(Parser, Debug)]
#[command(name = "nfio")]
#[command(about = "NFV orchestration state as a filesystem")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a catalog file and print its type schemas
    CheckConfig {
        /// TOML catalog to check
        file: PathBuf,
    },
    /// Drive the filesystem from stdin against a simulated orchestrator
    Shell {
        /// TOML catalog (built-in firewall/proxy/ids catalog if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let result = match args.command {
        Command::CheckConfig { file } => check_config(&file),
        Command::Shell { config } => run_shell(config.as_deref()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<NfioConfig> {
    match path {
        Some(path) => NfioConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => NfioConfig::builtin().context("loading built-in catalog"),
    }
}

fn check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    let catalog = config.catalog()?;
    let settings = config.client_settings();

    println!(
        "backend: timeout {}ms, retry on timeout {}",
        settings.timeout.as_millis(),
        settings.retry_on_timeout
    );
    for spec in catalog.types() {
        println!();
        println!("[{}]", spec.name);
        print!("{}", spec.render_schema());
    }
    Ok(())
}

async fn run_shell(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let orchestrator = Arc::new(MemoryOrchestrator::new());
    let engine = NfEngine::from_config(&config, orchestrator.clone())?;
    tracing::info!(types = engine.catalog().len(), "nfio shell ready");

    let mut shell = Shell::new(engine, orchestrator);
    if !std::io::stdin().is_terminal() {
        shell = shell.quiet();
    }
    let mut stdout = tokio::io::stdout();
    shell
        .run(BufReader::new(tokio::io::stdin()), &mut stdout)
        .await
}
