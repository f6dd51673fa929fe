//! Anthropic Messages API (claude-*).

use reqwest::RequestBuilder;
use serde_json::{json, Value};

use super::{join_text_blocks, ProviderAdapter};
use crate::error::{GenerationError, Result};
use crate::family::ModelFamily;
use crate::message::{Message, MessageSequence};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Default, Clone, Copy)]
pub struct Anthropic;

impl ProviderAdapter for Anthropic {
    const FAMILY: ModelFamily = ModelFamily::Anthropic;
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com/v1";

    fn endpoint(&self, base_url: &str, _model: &str) -> String {
        format!("{base_url}/messages")
    }

    fn authorize(&self, req: RequestBuilder, api_key: &str) -> RequestBuilder {
        req.header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    fn request_body(&self, model: &str, messages: &MessageSequence, max_tokens: u32) -> Value {
        // The system prompt is a top-level field, not a message
        let conversation: Vec<&Message> = messages.conversation().collect();
        let mut body = json!({
            "model":       model,
            "messages":    conversation,
            "max_tokens":  max_tokens,
            "temperature": 0,
        });
        if let Some(system) = messages.system() {
            body["system"] = Value::String(system.to_string());
        }
        body
    }

    fn extract_text(&self, envelope: &Value) -> Result<String> {
        if envelope["stop_reason"].as_str() == Some("refusal") {
            return Err(GenerationError::suppressed("stop_reason=refusal"));
        }
        let blocks = envelope["content"]
            .as_array()
            .ok_or_else(|| GenerationError::ProviderRequest("response has no content array".to_string()))?;
        Ok(join_text_blocks(blocks))
    }
}
