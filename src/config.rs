use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// HTTP surface settings. Not served yet; kept so deployments can set them.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub host: String,
    pub port: String,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Long-poll timeout for `getUpdates`, in seconds.
    pub poll_timeout: u32,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Flat pause after each handled update.
    pub update_delay: Duration,
    /// Capacity of the channel between the poller and the dispatch loop.
    pub update_buffer: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub gemini: GeminiConfig,
    pub dispatch: DispatchConfig,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_poll_timeout() -> u32 {
    30
}

fn default_update_delay_secs() -> u64 {
    3
}

fn default_update_buffer() -> usize {
    100
}

impl Config {
    /// Load a dotenv file into the process environment, then read the settings.
    pub fn load(path: &Path) -> Result<Self> {
        dotenv::from_path(path)
            .with_context(|| format!("Failed to load environment file: {}", path.display()))?;

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).unwrap_or_default();

        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .with_context(|| format!("Missing required setting: {}", key))
        };

        let base_url = lookup("GEMINI_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_base_url);

        Ok(Config {
            server: ServerConfig {
                host: optional("SERVER_HOST"),
                port: optional("SERVER_PORT"),
            },
            telegram: TelegramConfig {
                bot_token: required("TELEGRAM_BOT_TOKEN")?,
                poll_timeout: parse_or(&lookup, "TELEGRAM_POLL_TIMEOUT", default_poll_timeout)?,
            },
            gemini: GeminiConfig {
                api_key: required("GEMINI_KEY")?,
                model: required("GEMINI_MODEL")?,
                base_url,
            },
            dispatch: DispatchConfig {
                update_delay: Duration::from_secs(parse_or(
                    &lookup,
                    "UPDATE_DELAY_SECS",
                    default_update_delay_secs,
                )?),
                update_buffer: parse_or(&lookup, "UPDATE_BUFFER", default_update_buffer)?
                    .max(1),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: fn() -> T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => v
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, v)),
        _ => Ok(default()),
    }
}
