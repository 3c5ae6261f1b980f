mod amesh;
mod bot;
mod config;
mod error;
mod platform;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,amesh_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Timezone: {}", config.amesh.timezone);
    info!("  Base map: {}", config.amesh.base_map_url);
    info!("  Mask: {}", config.amesh.mask_url);
    info!("  Frames: {}", config.amesh.mesh_url_prefix);
    info!("  Slack API: {}", config.slack.api_base_url);
    if config.slack.bot_token.is_empty() {
        info!("  Slack bot token is empty; uploads will be rejected");
    }

    let state = Arc::new(AppState::new(&config)?);

    bot::run(state, config.server.listen_addr).await?;

    Ok(())
}
