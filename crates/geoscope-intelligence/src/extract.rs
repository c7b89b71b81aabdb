//! Lenient JSON extraction from model responses.
//!
//! Models are asked for JSON but sometimes wrap it in prose or fences.
//! The extractor tries the whole response, then the slice between the
//! first `{` and the last `}`, and finally keeps the raw text. Raw output
//! is never coerced into structure downstream.

use geoscope_types::ParsedAgentOutput;
use serde_json::Value;

pub fn extract_json(response: &str) -> ParsedAgentOutput {
    let trimmed = response.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return ParsedAgentOutput::Structured(value);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                if value.is_object() {
                    return ParsedAgentOutput::Structured(value);
                }
            }
        }
    }

    ParsedAgentOutput::Raw(response.to_string())
}
