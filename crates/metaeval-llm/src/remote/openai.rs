//! OpenAI Chat Completions (gpt-*).

use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Value};

use super::ProviderAdapter;
use crate::error::{GenerationError, Result};
use crate::family::ModelFamily;
use crate::message::MessageSequence;

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAi;

impl ProviderAdapter for OpenAi {
    const FAMILY: ModelFamily = ModelFamily::OpenAi;
    const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    fn endpoint(&self, base_url: &str, _model: &str) -> String {
        format!("{base_url}/chat/completions")
    }

    fn authorize(&self, req: RequestBuilder, api_key: &str) -> RequestBuilder {
        req.bearer_auth(api_key)
    }

    fn request_body(&self, model: &str, messages: &MessageSequence, max_tokens: u32) -> Value {
        json!({
            "model":       model,
            "messages":    messages,
            "max_tokens":  max_tokens,
            "temperature": 0,
        })
    }

    fn extract_text(&self, envelope: &Value) -> Result<String> {
        let choice = &envelope["choices"][0];
        if choice.is_null() {
            return Err(GenerationError::ProviderRequest("response has no choices".to_string()));
        }
        let message = &choice["message"];

        match message["content"].as_str() {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            content => {
                if choice["finish_reason"].as_str() == Some("content_filter") {
                    return Err(GenerationError::suppressed("finish_reason=content_filter"));
                }
                if let Some(refusal) = message["refusal"].as_str() {
                    return Err(GenerationError::suppressed(format!("refusal: {refusal}")));
                }
                content
                    .map(str::to_string)
                    .ok_or_else(|| GenerationError::ProviderRequest("message has no content".to_string()))
            }
        }
    }

    /// Azure-hosted deployments reject filtered prompts with a 400.
    fn suppression_from_error(&self, status: StatusCode, body: &Value) -> Option<String> {
        if status != StatusCode::BAD_REQUEST {
            return None;
        }
        match body["error"]["code"].as_str() {
            Some(code @ ("content_filter" | "content_policy_violation")) => Some(code.to_string()),
            _ => None,
        }
    }
}
