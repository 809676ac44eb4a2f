mod backend;
mod cli;
mod config;
mod error;
mod models;
mod services;
mod shell;

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::backend::Backend;
use crate::cli::Cli;
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load()?;
    tracing::debug!("Configuration loaded");

    let backend = Backend::connect(&config).await?;

    let code = cli::execute(cli, &config, backend).await;
    Ok(ExitCode::from(code))
}
