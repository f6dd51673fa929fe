//! Backend construction from a model identifier.

use metaeval_llm::remote::{AnthropicBackend, GeminiBackend, OpenAiBackend};
use metaeval_llm::{GenerationError, ModelFamily, ProviderConfig, ResponseGenerator};
use metaeval_local::LocalBackend;
use tracing::info;

use crate::config::{api_key_env, Config};

/// Build the backend that serves `config.run.model`.
///
/// The family comes from `run.family` when set, else from matching the
/// identifier. Nothing is generated here; local weights are loaded eagerly.
pub async fn select_backend(config: &Config) -> Result<Box<dyn ResponseGenerator>, GenerationError> {
    let model = config.run.model.as_deref().unwrap_or_default().trim();
    if model.is_empty() {
        return Err(GenerationError::UnsupportedModel(model.to_string()));
    }

    let family = match config.run.family {
        Some(family) => family,
        None => ModelFamily::detect(model)?,
    };
    info!(family = family.as_str(), model, "Selected backend");

    let max_new_tokens = config.run.max_new_tokens;
    let backend: Box<dyn ResponseGenerator> = match family {
        ModelFamily::OpenAi => {
            Box::new(OpenAiBackend::new(model, max_new_tokens, credentials(config, family)?)?)
        }
        ModelFamily::Anthropic => {
            Box::new(AnthropicBackend::new(model, max_new_tokens, credentials(config, family)?)?)
        }
        ModelFamily::Google => {
            Box::new(GeminiBackend::new(model, max_new_tokens, credentials(config, family)?)?)
        }
        ModelFamily::Local => {
            Box::new(LocalBackend::load(config.local.model_config(model, max_new_tokens)).await?)
        }
    };
    Ok(backend)
}

fn credentials(config: &Config, family: ModelFamily) -> Result<ProviderConfig, GenerationError> {
    config
        .providers
        .get(family)
        .and_then(|settings| settings.provider_config())
        .ok_or_else(|| {
            GenerationError::BackendConstruction(format!(
                "no API key for {family}: set providers.{family}.api_key or {}",
                api_key_env(family).unwrap_or_default()
            ))
        })
}
