use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::extract::{extract_text, NO_ANALYSIS};
use crate::llm::ModelClient;
use crate::platform::{ChatPlatform, IncomingMessage, IncomingUpdate, PhotoVariant, ReplyFormat};
use crate::prompt::{build_prompt, AnalysisRequest};

const USAGE: &str = "Hello! I'm your nutrition assistant.\n\n\
     Send me a list of ingredients as text, or a photo of a product label \
     (Nutrition Facts / ingredients), and I'll reply with a nutrition estimate, \
     ingredient red flags and a verdict.";

/// What happened to a single update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing actionable: no reply was sent.
    Skipped,
    /// One reply (analysis, usage or error text) was sent or attempted.
    Replied,
}

/// What a message asks for, decided before any external call.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Command,
    Text(&'a str),
    Photo(&'a PhotoVariant),
}

fn classify(message: &IncomingMessage) -> Option<Input<'_>> {
    if let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) {
        let command = text.split_whitespace().next().unwrap_or_default();
        let command = command.split('@').next().unwrap_or(command);
        if command == "/start" || command == "/help" {
            return Some(Input::Command);
        }
        return Some(Input::Text(text));
    }

    // The last variant is the highest resolution.
    message.photos.last().map(Input::Photo)
}

/// Serial consumer of chat updates: one update is fully handled (and the
/// configured delay observed) before the next one is taken.
pub struct Dispatcher {
    chat: Arc<dyn ChatPlatform>,
    model: Arc<dyn ModelClient>,
    delay: Duration,
}

impl Dispatcher {
    pub fn new(chat: Arc<dyn ChatPlatform>, model: Arc<dyn ModelClient>, delay: Duration) -> Self {
        Self { chat, model, delay }
    }

    /// Handle updates until the channel closes.
    pub async fn run(&self, mut updates: mpsc::Receiver<IncomingUpdate>) {
        info!("Dispatch loop started");

        while let Some(update) = updates.recv().await {
            // Skipped updates made no outbound call, so they don't wait.
            if self.handle_update(update).await == Outcome::Replied && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        info!("Update stream closed, dispatch loop stopped");
    }

    pub async fn handle_update(&self, update: IncomingUpdate) -> Outcome {
        let Some(message) = update.message else {
            return Outcome::Skipped;
        };
        let Some(input) = classify(&message) else {
            return Outcome::Skipped;
        };

        let chat_id = message.chat_id;
        let user = message.user_name.as_deref().unwrap_or("unknown");

        let result = match input {
            Input::Command => {
                self.reply(chat_id, USAGE, ReplyFormat::Plain).await;
                return Outcome::Replied;
            }
            Input::Text(text) => {
                info!("Text message from {} in chat {}: {}", user, chat_id, text);
                self.analyze(AnalysisRequest::Text {
                    chat_id,
                    text: text.to_string(),
                })
                .await
            }
            Input::Photo(photo) => {
                info!(
                    "Photo message from {} in chat {} ({}x{})",
                    user, chat_id, photo.width, photo.height
                );
                match self.fetch_photo(&photo.file_id).await {
                    Ok(bytes) => self.analyze(AnalysisRequest::Image { chat_id, bytes }).await,
                    Err(e) => Err(e),
                }
            }
        };

        match result {
            Ok(analysis) => {
                let analysis = if analysis.is_empty() {
                    NO_ANALYSIS.to_string()
                } else {
                    analysis
                };
                self.reply(chat_id, &analysis, ReplyFormat::Markdown).await;
            }
            Err(e) => {
                error!("Error handling update {}: {:#}", update.update_id, e);
                self.reply(chat_id, &format!("Error: {:#}", e), ReplyFormat::Plain)
                    .await;
            }
        }

        Outcome::Replied
    }

    async fn fetch_photo(&self, file_id: &str) -> Result<Vec<u8>> {
        let url = self.chat.resolve_file_url(file_id).await?;
        let bytes = self.chat.download(&url).await?;
        debug!("Fetched photo {} ({} bytes)", file_id, bytes.len());
        Ok(bytes)
    }

    /// Prompt the model and reduce its answer to reply text.
    async fn analyze(&self, request: AnalysisRequest) -> Result<String> {
        let chat_id = request.chat_id();
        self.chat.send_typing(chat_id).await.ok();

        let prompt = build_prompt(request);
        let response = self
            .model
            .generate_content(&prompt)
            .await
            .context("Analysis failed")?;

        Ok(extract_text(&response))
    }

    async fn reply(&self, chat_id: i64, text: &str, format: ReplyFormat) {
        if let Err(e) = self.chat.send_message(chat_id, text, format).await {
            error!("Failed to send reply to chat {}: {:#}", chat_id, e);
        }
    }
}
