pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// One event from the chat platform's update stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingUpdate {
    pub update_id: u32,
    /// `None` for updates that don't carry a new message (edits, callbacks, ...).
    pub message: Option<IncomingMessage>,
}

/// A message received from the chat platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    /// Sender handle, only used in logs
    pub user_name: Option<String>,
    pub text: Option<String>,
    /// Size variants of an attached photo, smallest first.
    pub photos: Vec<PhotoVariant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoVariant {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

/// How the platform should render an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    Plain,
    /// Lightweight markup (Telegram legacy Markdown).
    Markdown,
}

/// The chat-service calls the dispatch loop depends on.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Resolve a file identifier to a URL its bytes can be fetched from.
    async fn resolve_file_url(&self, file_id: &str) -> Result<String>;

    /// Fetch raw bytes with a plain GET.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;

    async fn send_message(&self, chat_id: i64, text: &str, format: ReplyFormat) -> Result<()>;

    /// Show a "typing" indicator while a reply is being prepared.
    async fn send_typing(&self, _chat_id: i64) -> Result<()> {
        Ok(())
    }
}
