mod bot;
mod config;
mod expense;
mod platform;
mod rate;
mod sheet;
mod table;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets usually live in .env during local runs; RUST_LOG may too
    let dotenv_path = dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,won_ledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = dotenv_path {
        info!("Loaded environment from {}", path.display());
    }

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Rate API: {}", config.rate.api_url);
    info!("  Fallback rate: {}", config.rate.fallback);
    info!("  Sheet webhook: {}", config.sheet.url().unwrap_or("(not set)"));
    info!("  Table keyword: {}", config.bot.table_keyword);

    let state = Arc::new(AppState::new(config)?);

    info!("Bot is starting...");
    bot::run(state).await?;

    Ok(())
}
