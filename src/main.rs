//! enhance-settings - drive the AI enhancement settings from the command line

mod cli;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use enhance_settings::config::Config;
use tracing_subscriber::EnvFilter;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let config = Config::load_or_create(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ok = cli::run(cli.command, &config, &config_path).await?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
