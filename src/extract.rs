use crate::llm::{ModelResponse, ResponsePart};

/// Reply used when the model produced no candidate or an empty one.
pub const NO_ANALYSIS: &str = "No analysis returned.";

/// Reduce a model response to the text of its first candidate.
///
/// Non-text parts are skipped. The result may be empty when the candidate
/// only carried non-text parts.
pub fn extract_text(response: &ModelResponse) -> String {
    let Some(candidate) = response.candidates.first() else {
        return NO_ANALYSIS.to_string();
    };
    if candidate.parts.is_empty() {
        return NO_ANALYSIS.to_string();
    }

    candidate
        .parts
        .iter()
        .filter_map(|part| match part {
            ResponsePart::Text(text) => Some(text.as_str()),
            ResponsePart::Other => None,
        })
        .collect()
}
