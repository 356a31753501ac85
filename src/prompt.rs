const PROMPT_PREFIX: &str = "You are an expert Nutritionist and Food Safety Officer. \
Your task is to analyze the provided food product data (Ingredients and/or Nutrition Facts) \
for safety and health implications.\n";

const PROMPT_SUFFIX: &str = "
**Instructions:**
1. Analyze the ingredient quality.
2. If specific nutrition numbers (grams/calories) are not provided, estimate whether they are Low/Medium/High based on the ingredient order.
3. Keep the output concise and scannable.

Please output the response using this format:

📊 Nutrition Estimation
Profile: [High Carb / High Protein / Balanced / High Fat]
Key Levels: Estimate Sugar and Sodium levels (Low/Moderate/High).

⚠️ Ingredient Analysis
Red Flags: List any ultra-processed additives, preservatives, artificial colors, or hidden sugars.
Allergens/Sensitivities: Highlight common allergens (Dairy, Soy, Nuts, Gluten, etc.).
Positive Callouts: Mention beneficial whole-food ingredients.

✅ Verdict
Rating: [Healthy / Moderate / Unhealthy]
Summary: A one-sentence conclusion on whether this should be consumed daily or strictly limited.
";

/// Format token used when the image bytes can't be identified.
pub const FALLBACK_IMAGE_FORMAT: &str = "jpeg";

/// One analysis job, built by the dispatch loop from an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisRequest {
    Text { chat_id: i64, text: String },
    Image { chat_id: i64, bytes: Vec<u8> },
}

impl AnalysisRequest {
    pub fn chat_id(&self) -> i64 {
        match self {
            AnalysisRequest::Text { chat_id, .. } | AnalysisRequest::Image { chat_id, .. } => {
                *chat_id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    /// Raw image bytes tagged with a bare format token such as `"jpeg"`.
    /// The model client adds the `image/` media-type prefix itself.
    Image { format: String, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub parts: Vec<PromptPart>,
}

/// Turn a request into the parts sent to the model.
///
/// Text requests become a single instruction part wrapping the user's text as
/// input data. Image requests become the image followed by the instructions;
/// the image bytes are moved into the prompt untouched.
pub fn build_prompt(request: AnalysisRequest) -> Prompt {
    let parts = match request {
        AnalysisRequest::Text { text, .. } => vec![PromptPart::Text(format!(
            "{PROMPT_PREFIX}Input Data: {text}{PROMPT_SUFFIX}"
        ))],
        AnalysisRequest::Image { bytes, .. } => {
            let format = detect_image_format(&bytes).to_string();
            vec![
                PromptPart::Image {
                    format,
                    data: bytes,
                },
                PromptPart::Text(format!("{PROMPT_PREFIX}{PROMPT_SUFFIX}")),
            ]
        }
    };

    Prompt { parts }
}

/// Sniff the image encoding from its leading bytes and return the bare
/// format token (`"png"`, `"jpeg"`, ...).
pub fn detect_image_format(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
        .map(format_token)
        .filter(|token| !token.is_empty())
        .unwrap_or(FALLBACK_IMAGE_FORMAT)
}

/// Strip the `image/` prefix and any parameters from a media type.
fn format_token(media_type: &str) -> &str {
    let subtype = media_type
        .split_once('/')
        .map(|(_, subtype)| subtype)
        .unwrap_or(media_type);
    subtype.split(';').next().unwrap_or(subtype).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_HEADER: &[u8] = &[
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00,
    ];
    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    #[test]
    fn test_text_prompt_is_single_wrapped_part() {
        let prompt = build_prompt(AnalysisRequest::Text {
            chat_id: 7,
            text: "sugar, palm oil, hazelnuts".to_string(),
        });

        assert_eq!(prompt.parts.len(), 1);
        assert_eq!(
            prompt.parts[0],
            PromptPart::Text(format!(
                "{}Input Data: sugar, palm oil, hazelnuts{}",
                PROMPT_PREFIX, PROMPT_SUFFIX
            ))
        );
    }

    #[test]
    fn test_text_prompt_with_empty_text_is_not_empty() {
        let prompt = build_prompt(AnalysisRequest::Text {
            chat_id: 7,
            text: String::new(),
        });
        assert_eq!(prompt.parts.len(), 1);
        match &prompt.parts[0] {
            PromptPart::Text(text) => assert!(text.contains("Input Data: ")),
            other => panic!("unexpected part: {:?}", other),
        }
    }

    #[test]
    fn test_image_prompt_puts_image_first() {
        let bytes = JPEG_HEADER.to_vec();
        let prompt = build_prompt(AnalysisRequest::Image {
            chat_id: 7,
            bytes: bytes.clone(),
        });

        assert_eq!(prompt.parts.len(), 2);
        assert_eq!(
            prompt.parts[0],
            PromptPart::Image {
                format: "jpeg".to_string(),
                data: bytes,
            }
        );
        match &prompt.parts[1] {
            PromptPart::Text(text) => {
                assert_eq!(text, &format!("{}{}", PROMPT_PREFIX, PROMPT_SUFFIX));
                assert!(!text.contains("Input Data"));
            }
            other => panic!("unexpected part: {:?}", other),
        }
    }

    #[test]
    fn test_image_prompt_format_has_no_media_prefix() {
        let prompt = build_prompt(AnalysisRequest::Image {
            chat_id: 1,
            bytes: PNG_HEADER.to_vec(),
        });
        match &prompt.parts[0] {
            PromptPart::Image { format, .. } => {
                assert_eq!(format, "png");
                assert!(!format.contains("image/"));
            }
            other => panic!("unexpected part: {:?}", other),
        }
    }

    #[test]
    fn test_detect_jpeg() {
        assert_eq!(detect_image_format(JPEG_HEADER), "jpeg");
    }

    #[test]
    fn test_detect_png() {
        assert_eq!(detect_image_format(PNG_HEADER), "png");
    }

    #[test]
    fn test_detect_other_formats() {
        assert_eq!(detect_image_format(b"RIFF\x24\x00\x00\x00WEBPVP8 "), "webp");
        assert_eq!(detect_image_format(b"GIF89a\x01\x00\x01\x00"), "gif");
    }

    #[test]
    fn test_detect_falls_back_to_jpeg() {
        assert_eq!(detect_image_format(&[]), "jpeg");
        assert_eq!(detect_image_format(b"plain text, not an image"), "jpeg");
    }

    #[test]
    fn test_format_token_strips_prefix_and_params() {
        assert_eq!(format_token("image/jpeg"), "jpeg");
        assert_eq!(format_token("image/png; charset=binary"), "png");
        assert_eq!(format_token("webp"), "webp");
    }

    #[test]
    fn test_request_chat_id() {
        let text = AnalysisRequest::Text {
            chat_id: 42,
            text: "apple".to_string(),
        };
        let image = AnalysisRequest::Image {
            chat_id: -100,
            bytes: vec![],
        };
        assert_eq!(text.chat_id(), 42);
        assert_eq!(image.chat_id(), -100);
    }
}
