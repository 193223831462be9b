mod capture;
mod cli;
mod config;
mod daemon;
mod db;
mod duration;
mod error;
mod job_state;
mod maintenance;
mod models;
mod probe;
mod scheduler;
mod server;
mod store;
mod thumbnail;
mod time_util;
mod video;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::config::{load_config, validate_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config().context("loading configuration from environment")?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("config loaded from environment");

    validate_config(&config).context("config validation failed")?;
    info!("config validated successfully");

    match cli.command {
        Some(Commands::ValidateConfig) => {
            println!("Configuration is valid.");
        }
        Some(Commands::Serve) | None => {
            daemon::run(config).await?;
        }
    }

    Ok(())
}
