//! Hosted provider backends.
//!
//! One [`RemoteBackend`] drives every provider: prompts are sent one at a
//! time, in order, and each family only supplies a [`ProviderAdapter`] that
//! knows its endpoint, auth headers, request body and response envelope.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{ensure_aligned, validate_request, validate_token_budget, ResponseGenerator};
use crate::error::{GenerationError, Result};
use crate::family::ModelFamily;
use crate::message::MessageSequence;

pub use anthropic::Anthropic;
pub use gemini::Gemini;
pub use openai::OpenAi;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Credentials and options for one provider family.
#[derive(Debug)]
pub struct ProviderConfig {
    pub api_key: SecretString,
    /// Overrides the adapter's default API root.
    pub base_url: Option<String>,
    /// Pause inserted between consecutive requests (requests-per-minute ceilings).
    pub request_delay: Option<Duration>,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_secret(SecretString::from(api_key.into()))
    }

    pub fn from_secret(api_key: SecretString) -> Self {
        Self {
            api_key,
            base_url: None,
            request_delay: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = (!delay.is_zero()).then_some(delay);
        self
    }
}

// ── Adapter seam ──────────────────────────────────────────────────────────────

/// Per-family request shape and envelope extraction.
pub trait ProviderAdapter: Send + Sync + Default {
    const FAMILY: ModelFamily;
    const DEFAULT_BASE_URL: &'static str;

    fn endpoint(&self, base_url: &str, model: &str) -> String;

    fn authorize(&self, req: RequestBuilder, api_key: &str) -> RequestBuilder;

    /// Serialize one turn. Decoding is always greedy (temperature 0).
    fn request_body(&self, model: &str, messages: &MessageSequence, max_tokens: u32) -> Value;

    /// Pull the generated text out of a successful envelope. Returns
    /// [`GenerationError::ContentSuppressed`] when the provider withheld it.
    fn extract_text(&self, envelope: &Value) -> Result<String>;

    /// Some providers report moderation blocks as HTTP errors.
    fn suppression_from_error(&self, _status: StatusCode, _body: &Value) -> Option<String> {
        None
    }
}

enum Outcome {
    Text(String),
    Suppressed { reason: String, envelope: Value },
}

// ── Backend ───────────────────────────────────────────────────────────────────

pub struct RemoteBackend<A: ProviderAdapter> {
    model: String,
    max_new_tokens: u32,
    base_url: String,
    api_key: SecretString,
    request_delay: Option<Duration>,
    adapter: A,
    client: reqwest::Client,
}

pub type OpenAiBackend = RemoteBackend<OpenAi>;
pub type AnthropicBackend = RemoteBackend<Anthropic>;
pub type GeminiBackend = RemoteBackend<Gemini>;

impl<A: ProviderAdapter> RemoteBackend<A> {
    pub fn new(model: impl Into<String>, max_new_tokens: u32, config: ProviderConfig) -> Result<Self> {
        let model = model.into();
        let max_new_tokens = validate_token_budget(max_new_tokens)?;
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(GenerationError::BackendConstruction(format!(
                "no API key configured for {} (model {model})",
                A::FAMILY
            )));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GenerationError::BackendConstruction(format!("HTTP client: {e}")))?;

        let base_url = config
            .base_url
            .unwrap_or_else(|| A::DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        info!(family = A::FAMILY.as_str(), model = %model, base_url = %base_url, "Remote backend ready");

        Ok(Self {
            model,
            max_new_tokens,
            base_url,
            api_key: config.api_key,
            request_delay: config.request_delay,
            adapter: A::default(),
            client,
        })
    }

    async fn complete(&self, messages: &MessageSequence) -> Result<Outcome> {
        let url = self.adapter.endpoint(&self.base_url, &self.model);
        let body = self.adapter.request_body(&self.model, messages, self.max_new_tokens);
        let resp = self.adapter
            .authorize(self.client.post(&url), self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));
            if let Some(reason) = self.adapter.suppression_from_error(status, &body) {
                return Ok(Outcome::Suppressed { reason, envelope: body });
            }
            return Err(status_error(status, &body));
        }

        let envelope: Value = serde_json::from_str(&text)?;
        match self.adapter.extract_text(&envelope) {
            Ok(text) => Ok(Outcome::Text(text)),
            Err(GenerationError::ContentSuppressed { reason }) => {
                Ok(Outcome::Suppressed { reason, envelope })
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<A: ProviderAdapter> ResponseGenerator for RemoteBackend<A> {
    async fn generate_responses(
        &self,
        prompts: &[String],
        batch_size: usize,
        system_prompt: Option<&str>,
    ) -> Result<Vec<String>> {
        validate_request(prompts, batch_size)?;

        let start = Instant::now();
        let mut responses = Vec::with_capacity(prompts.len());
        let mut suppressed = 0usize;

        for (index, prompt) in prompts.iter().enumerate() {
            let messages = MessageSequence::assemble(prompt, system_prompt);

            match self.complete(&messages).await? {
                Outcome::Text(text) => responses.push(text),
                Outcome::Suppressed { reason, envelope } => {
                    warn!(
                        family = A::FAMILY.as_str(),
                        model = %self.model,
                        index,
                        reason = %reason,
                        request = %serde_json::to_string(&messages).unwrap_or_default(),
                        response = %envelope,
                        "Provider suppressed response, recording empty string"
                    );
                    suppressed += 1;
                    responses.push(String::new());
                }
            }
            debug!(model = %self.model, done = index + 1, total = prompts.len(), "Prompt completed");

            if let Some(delay) = self.request_delay {
                if index + 1 < prompts.len() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        ensure_aligned(prompts, &responses)?;
        info!(
            family = A::FAMILY.as_str(),
            model = %self.model,
            prompts = prompts.len(),
            suppressed,
            elapsed_s = start.elapsed().as_secs_f32(),
            "Remote generation finished"
        );
        Ok(responses)
    }

    fn family(&self) -> ModelFamily { A::FAMILY }
    fn model_id(&self) -> &str { &self.model }
    fn max_new_tokens(&self) -> u32 { self.max_new_tokens }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn status_error(status: StatusCode, body: &Value) -> GenerationError {
    let message = body["error"]["message"]
        .as_str()
        .or_else(|| body["message"].as_str())
        .or_else(|| body.as_str())
        .unwrap_or("unknown API error")
        .to_string();
    GenerationError::ProviderStatus { status: status.as_u16(), message }
}

/// Concatenate the `text` field of every block in `blocks`.
pub(crate) fn join_text_blocks(blocks: &[Value]) -> String {
    blocks.iter().filter_map(|b| b["text"].as_str()).collect()
}
