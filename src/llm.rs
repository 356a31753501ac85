use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GeminiConfig;
use crate::prompt::{Prompt, PromptPart};

/// A model reply: ordered candidates, each with ordered content parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResponse {
    pub candidates: Vec<Candidate>,
    /// Why the provider refused the prompt, if it did.
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    Text(String),
    /// Inline data, function calls and anything else that isn't plain text.
    Other,
}

/// A generative model that can answer a multimodal prompt.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate_content(&self, prompt: &Prompt) -> Result<ModelResponse>;
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl From<&Prompt> for GenerateContentRequest {
    fn from(prompt: &Prompt) -> Self {
        let parts = prompt
            .parts
            .iter()
            .map(|part| match part {
                PromptPart::Text(text) => RequestPart::Text { text: text.clone() },
                PromptPart::Image { format, data } => RequestPart::InlineData {
                    inline_data: InlineData {
                        mime_type: format!("image/{}", format),
                        data: general_purpose::STANDARD.encode(data),
                    },
                },
            })
            .collect();

        Self {
            contents: vec![RequestContent {
                role: "user".to_string(),
                parts,
            }],
        }
    }
}

impl From<GenerateContentResponse> for ModelResponse {
    fn from(response: GenerateContentResponse) -> Self {
        let candidates = response
            .candidates
            .into_iter()
            .map(|candidate| {
                if let Some(reason) = &candidate.finish_reason {
                    debug!("Gemini candidate finished: {}", reason);
                }
                let parts = candidate
                    .content
                    .map(|content| {
                        content
                            .parts
                            .into_iter()
                            .map(|part| match part.text {
                                Some(text) => ResponsePart::Text(text),
                                None => ResponsePart::Other,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Candidate { parts }
            })
            .collect();

        Self {
            candidates,
            block_reason: response.prompt_feedback.and_then(|f| f.block_reason),
        }
    }
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        anyhow::ensure!(!config.api_key.trim().is_empty(), "Gemini API key is empty");
        anyhow::ensure!(!config.model.trim().is_empty(), "Gemini model name is empty");

        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build Gemini HTTP client")?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        let model = self.config.model.trim();
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate_content(&self, prompt: &Prompt) -> Result<ModelResponse> {
        let request = GenerateContentRequest::from(prompt);
        let url = self.endpoint();

        debug!(
            "Sending request to Gemini: {} ({} part(s))",
            url,
            prompt.parts.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Gemini")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({}): {}", status, error_body);
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        let model_response = ModelResponse::from(body);
        if let Some(reason) = &model_response.block_reason {
            warn!("Gemini blocked the prompt: {}", reason);
        }
        debug!(
            "Gemini response received with {} candidate(s)",
            model_response.candidates.len()
        );

        Ok(model_response)
    }
}
