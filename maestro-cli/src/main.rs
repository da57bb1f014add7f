//! Maestro CLI
//!
//! Command-line front-end for the Maestro execution engine: run jobs,
//! workflows, and tasks from the manifest, and inspect the recorded history.
//!
//! Exits 0 on success and 1 on any fatal engine error, including manifest
//! validation failures.

mod commands;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{handle_command, Commands};
use config::EngineConfig;

#[derive(Parser)]
#[command(name = "maestro")]
#[command(about = "Manifest-driven automation orchestrator", long_about = None)]
struct Cli {
    /// Engine configuration file
    #[arg(long, env = "MAESTRO_CONFIG", default_value = "maestro.json")]
    config: std::path::PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = EngineConfig::load(&cli.config)?;
    init_tracing(&config)?;

    handle_command(cli.command, &config).await
}

/// Initialize logging: stdout always, plus a log file when the config names
/// a logging directory.
fn init_tracing(config: &EngineConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "maestro=info,maestro_engine=info,maestro_store=info".into());

    match config.log_directory() {
        Some(directory) => {
            std::fs::create_dir_all(&directory).with_context(|| {
                format!("failed to create log directory {}", directory.display())
            })?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(directory.join("maestro.log"))
                .context("failed to open log file")?;

            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}
