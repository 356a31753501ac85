mod config;
mod dispatch;
mod extract;
mod llm;
mod platform;
mod prompt;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::llm::GeminiClient;
use crate::platform::telegram::{self, TelegramPlatform};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nutribot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let env_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".env"));

    info!("Loading configuration from: {}", env_path.display());
    let config = Config::load(&env_path)
        .with_context(|| format!("Failed to load config from {}", env_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Model: {}", config.gemini.model);
    info!("  Poll timeout: {}s", config.telegram.poll_timeout);
    info!("  Update delay: {:?}", config.dispatch.update_delay);
    info!(
        "  Server (reserved): {}:{}",
        config.server.host, config.server.port
    );

    // Provider clients; a failure here stops the process before polling starts
    let model = GeminiClient::new(config.gemini.clone()).context("Failed to create Gemini client")?;
    let chat = TelegramPlatform::connect(&config.telegram)
        .await
        .context("Failed to create Telegram bot")?;

    let updates = telegram::spawn_poller(
        chat.bot(),
        config.telegram.poll_timeout,
        config.dispatch.update_buffer,
    );
    let dispatcher = Dispatcher::new(
        Arc::new(chat),
        Arc::new(model),
        config.dispatch.update_delay,
    );

    info!("Bot is starting...");
    tokio::select! {
        _ = dispatcher.run(updates) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
