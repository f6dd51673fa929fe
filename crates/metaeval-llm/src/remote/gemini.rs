//! Google Gemini `generateContent` (gemini-*).
//!
//! Safety filtering is relaxed to `BLOCK_NONE` for every adjustable harm
//! category so refusals do not skew the evaluation. When Gemini still
//! withholds text the response carries no candidate parts.

use reqwest::RequestBuilder;
use serde_json::{json, Value};

use super::{join_text_blocks, ProviderAdapter};
use crate::error::{GenerationError, Result};
use crate::family::ModelFamily;
use crate::message::MessageSequence;

pub const RELAXED_HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct Gemini;

impl ProviderAdapter for Gemini {
    const FAMILY: ModelFamily = ModelFamily::Google;
    const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    fn endpoint(&self, base_url: &str, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{base_url}/models/{model}:generateContent")
    }

    fn authorize(&self, req: RequestBuilder, api_key: &str) -> RequestBuilder {
        req.header("x-goog-api-key", api_key)
    }

    fn request_body(&self, _model: &str, messages: &MessageSequence, max_tokens: u32) -> Value {
        let contents: Vec<Value> = messages
            .conversation()
            .map(|m| json!({ "role": "user", "parts": [{ "text": m.content }] }))
            .collect();

        let safety: Vec<Value> = RELAXED_HARM_CATEGORIES
            .iter()
            .map(|category| json!({ "category": category, "threshold": "BLOCK_NONE" }))
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": max_tokens,
                "temperature":     0,
            },
            "safetySettings": safety,
        });
        if let Some(system) = messages.system() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    fn extract_text(&self, envelope: &Value) -> Result<String> {
        let candidate = &envelope["candidates"][0];
        if let Some(parts) = candidate["content"]["parts"].as_array() {
            if !parts.is_empty() {
                return Ok(join_text_blocks(parts));
            }
        }

        let reason = envelope["promptFeedback"]["blockReason"]
            .as_str()
            .map(|r| format!("prompt blocked: {r}"))
            .or_else(|| candidate["finishReason"].as_str().map(|r| format!("finishReason={r}")))
            .unwrap_or_else(|| "no candidate text".to_string());
        Err(GenerationError::suppressed(reason))
    }
}
