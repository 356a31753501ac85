use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId, ParseMode, UpdateKind};
use teloxide::update_listeners::{AsUpdateStream, Polling};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::TelegramConfig;
use crate::platform::{ChatPlatform, IncomingMessage, IncomingUpdate, PhotoVariant, ReplyFormat};

const FILE_BASE_URL: &str = "https://api.telegram.org/file";

/// Telegram's limit on a single message's text, in UTF-16 code units
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Cut text to at most `max_units` UTF-16 code units without splitting a char.
fn truncate_message(text: &str, max_units: usize) -> &str {
    let mut units = 0;
    for (idx, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > max_units {
            return &text[..idx];
        }
    }
    text
}

pub struct TelegramPlatform {
    bot: Bot,
    http: reqwest::Client,
}

impl TelegramPlatform {
    /// Build the bot client and check the token with `getMe`.
    pub async fn connect(config: &TelegramConfig) -> Result<Self> {
        // Long polls must not be cut short by the client-side timeout.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(u64::from(config.poll_timeout) + 10))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        let bot = Bot::with_client(&config.bot_token, client);

        let me = bot
            .get_me()
            .await
            .context("Failed to authorize Telegram bot")?;
        info!(
            "Bot authorized as @{}",
            me.user.username.as_deref().unwrap_or("unknown")
        );

        Ok(Self {
            bot,
            http: reqwest::Client::new(),
        })
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn resolve_file_url(&self, file_id: &str) -> Result<String> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .context("Failed to resolve file")?;

        Ok(format!(
            "{}/bot{}/{}",
            FILE_BASE_URL,
            self.bot.token(),
            file.path
        ))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        // The URL embeds the bot token, so it is stripped from every error.
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(reqwest::Error::without_url)
            .context("Failed to download file")?;

        let bytes = response
            .bytes()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to read downloaded file")?;

        debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn send_message(&self, chat_id: i64, text: &str, format: ReplyFormat) -> Result<()> {
        let text = truncate_message(text, MAX_MESSAGE_LEN);
        let request = self.bot.send_message(ChatId(chat_id), text.to_string());

        #[allow(deprecated)]
        let request = match format {
            ReplyFormat::Plain => request,
            ReplyFormat::Markdown => request.parse_mode(ParseMode::Markdown),
        };

        request.await.context("Failed to send message")?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<()> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .context("Failed to send chat action")?;
        Ok(())
    }
}

/// Start a background long-poll listener feeding updates into a bounded channel.
///
/// The listener stops once the returned receiver is dropped.
pub fn spawn_poller(bot: Bot, poll_timeout: u32, buffer: usize) -> mpsc::Receiver<IncomingUpdate> {
    let (tx, rx) = mpsc::channel(buffer);
    tokio::spawn(forward_updates(bot, poll_timeout, tx));
    rx
}

async fn forward_updates(bot: Bot, poll_timeout: u32, tx: mpsc::Sender<IncomingUpdate>) {
    info!("Starting Telegram long polling (timeout {}s)", poll_timeout);

    let mut polling = Polling::builder(bot)
        .timeout(Duration::from_secs(u64::from(poll_timeout)))
        .build();
    let stream = polling.as_stream();
    tokio::pin!(stream);

    while let Some(update) = stream.next().await {
        match update {
            Ok(update) => {
                if tx.send(convert_update(&update)).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("Failed to get updates: {}", e),
        }
    }

    info!("Update channel closed, Telegram polling stopped");
}

fn convert_update(update: &Update) -> IncomingUpdate {
    let message = match &update.kind {
        UpdateKind::Message(msg) => Some(convert_message(msg)),
        _ => None,
    };

    IncomingUpdate {
        update_id: update.id.0,
        message,
    }
}

fn convert_message(msg: &Message) -> IncomingMessage {
    let photos = msg
        .photo()
        .map(|sizes| {
            sizes
                .iter()
                .map(|size| PhotoVariant {
                    file_id: size.file.id.0.clone(),
                    width: size.width,
                    height: size.height,
                })
                .collect()
        })
        .unwrap_or_default();

    IncomingMessage {
        chat_id: msg.chat.id.0,
        user_name: msg.from.as_ref().and_then(|user| user.username.clone()),
        text: msg.text().map(str::to_string),
        photos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse a raw `getUpdates` entry the way it arrives over HTTP.
    fn parse_update(raw: &str) -> Update {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_message("hello", 10), "hello");
        assert_eq!(truncate_message("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_counts_utf16_units() {
        // Each emoji is two UTF-16 code units.
        let text = "📊📊📊";
        assert_eq!(truncate_message(text, 6), text);
        assert_eq!(truncate_message(text, 5), "📊📊");
        assert_eq!(truncate_message(text, 4), "📊📊");
        assert_eq!(truncate_message(text, 1), "");
        assert_eq!(truncate_message(text, 0), "");
    }

    #[test]
    fn test_truncate_long_emoji_reply_fits_limit() {
        let text = "⚠️📊".repeat(2000);
        let truncated = truncate_message(&text, MAX_MESSAGE_LEN);
        assert!(truncated.encode_utf16().count() <= MAX_MESSAGE_LEN);
        assert!(text.starts_with(truncated));
        assert!(truncated.chars().count() < MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_convert_text_message() {
        let update = parse_update(
            r#"{
                "update_id": 10,
                "message": {
                    "message_id": 1,
                    "date": 1700000000,
                    "chat": { "id": 42, "type": "private", "first_name": "Ann" },
                    "from": { "id": 7, "is_bot": false, "first_name": "Ann", "username": "ann" },
                    "text": "apple"
                }
            }"#,
        );

        let incoming = convert_update(&update);

        assert_eq!(incoming.update_id, 10);
        let message = incoming.message.unwrap();
        assert_eq!(message.chat_id, 42);
        assert_eq!(message.user_name.as_deref(), Some("ann"));
        assert_eq!(message.text.as_deref(), Some("apple"));
        assert!(message.photos.is_empty());
    }

    #[test]
    fn test_convert_photo_message_keeps_order() {
        let update = parse_update(
            r#"{
                "update_id": 11,
                "message": {
                    "message_id": 2,
                    "date": 1700000000,
                    "chat": { "id": 42, "type": "private", "first_name": "Ann" },
                    "photo": [
                        { "file_id": "small", "file_unique_id": "s", "file_size": 100, "width": 90, "height": 60 },
                        { "file_id": "large", "file_unique_id": "l", "file_size": 9000, "width": 1280, "height": 853 }
                    ]
                }
            }"#,
        );

        let message = convert_update(&update).message.unwrap();

        assert_eq!(message.text, None);
        assert_eq!(message.photos.len(), 2);
        assert_eq!(message.photos[0].file_id, "small");
        assert_eq!(message.photos[1].file_id, "large");
        assert_eq!(message.photos[1].width, 1280);
    }

    #[test]
    fn test_convert_non_message_update() {
        let update = parse_update(
            r#"{
                "update_id": 12,
                "edited_message": {
                    "message_id": 1,
                    "date": 1700000000,
                    "edit_date": 1700000100,
                    "chat": { "id": 42, "type": "private", "first_name": "Ann" },
                    "text": "apple pie"
                }
            }"#,
        );

        let incoming = convert_update(&update);

        assert_eq!(incoming.update_id, 12);
        assert_eq!(incoming.message, None);
    }
}
