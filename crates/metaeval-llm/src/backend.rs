//! The response-generation contract every backend implements.
//!
//! Backends:
//!   LocalBackend              batched greedy decoding on a local model (metaeval-local)
//!   RemoteBackend<OpenAi>     OpenAI Chat Completions API (gpt-*)
//!   RemoteBackend<Anthropic>  Anthropic Messages API (claude-*)
//!   RemoteBackend<Gemini>     Google Gemini API (gemini-*)

use async_trait::async_trait;

use crate::error::{GenerationError, Result};
use crate::family::ModelFamily;

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Given a list of prompts and a token budget, return one string per prompt,
/// in order.
///
/// `result[i]` always answers `prompts[i]`; a prompt the provider refused to
/// answer yields `""` rather than a missing slot. `batch_size` is honoured by
/// backends that batch and ignored by sequential ones.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate_responses(
        &self,
        prompts: &[String],
        batch_size: usize,
        system_prompt: Option<&str>,
    ) -> Result<Vec<String>>;

    fn family(&self) -> ModelFamily;
    fn model_id(&self) -> &str;
    fn max_new_tokens(&self) -> u32;
}

// ── Request invariants ───────────────────────────────────────────────────────

/// Reject requests that break the generation invariants before any work is done.
pub fn validate_request(prompts: &[String], batch_size: usize) -> Result<()> {
    if prompts.is_empty() {
        return Err(GenerationError::InvalidRequest("prompt list is empty".to_string()));
    }
    if batch_size == 0 {
        return Err(GenerationError::InvalidRequest("batch_size must be positive".to_string()));
    }
    Ok(())
}

/// Checked token budget shared by backend constructors.
pub fn validate_token_budget(max_new_tokens: u32) -> Result<u32> {
    if max_new_tokens == 0 {
        return Err(GenerationError::BackendConstruction(
            "max_new_tokens must be positive".to_string(),
        ));
    }
    Ok(max_new_tokens)
}

/// Guard the alignment invariant on a finished result.
pub fn ensure_aligned(prompts: &[String], responses: &[String]) -> Result<()> {
    if prompts.len() != responses.len() {
        return Err(GenerationError::Engine(format!(
            "backend returned {} responses for {} prompts",
            responses.len(),
            prompts.len()
        )));
    }
    Ok(())
}
