//! Batched local generation behind the shared `ResponseGenerator` contract.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use metaeval_llm::backend::{ensure_aligned, validate_request, validate_token_budget};
use metaeval_llm::{GenerationError, MessageSequence, ModelFamily, ResponseGenerator};

use crate::causal_lm::CausalLmEngine;
use crate::engine::GenerationEngine;
use crate::hub::ModelFiles;
use crate::template::ChatTemplate;
use crate::{LocalError, LocalModelConfig, Result};

type GenResult<T> = std::result::Result<T, GenerationError>;

/// Local model backend.
///
/// Each prompt is assembled into a message sequence, flattened through the
/// model's chat template and handed to the engine in consecutive batches of
/// `batch_size`. Batches run one after another on the blocking pool.
pub struct LocalBackend<E: GenerationEngine = CausalLmEngine> {
    model_id: String,
    engine: Arc<E>,
    template: ChatTemplate,
    max_new_tokens: u32,
}

impl LocalBackend<CausalLmEngine> {
    /// Resolve, download and load a model. Any failure here is fatal to the run.
    pub async fn load(config: LocalModelConfig) -> GenResult<Self> {
        let max_new_tokens = validate_token_budget(config.max_new_tokens)?;
        let start = Instant::now();
        info!("Loading local model: {}", config.model_id);

        let model_id = config.model_id.clone();
        // hf-hub and candle loading are blocking
        let (engine, template) = tokio::task::spawn_blocking(move || -> Result<_> {
            let files = ModelFiles::resolve(&config)?;
            let template = ChatTemplate::load(&files, config.add_generation_prompt)?;
            let engine = CausalLmEngine::load(&files, &config)?;
            Ok((engine, template))
        })
        .await
        .map_err(|e| GenerationError::BackendConstruction(format!("load task failed: {e}")))?
        .map_err(LocalError::into_construction)?;

        info!(
            model = %model_id,
            architecture = ?engine.architecture(),
            gpu = engine.is_gpu(),
            elapsed_s = start.elapsed().as_secs_f32(),
            "Local backend ready"
        );
        Self::with_engine(model_id, engine, template, max_new_tokens)
    }
}

impl<E: GenerationEngine> LocalBackend<E> {
    pub fn with_engine(
        model_id: impl Into<String>,
        engine: E,
        template: ChatTemplate,
        max_new_tokens: u32,
    ) -> GenResult<Self> {
        Ok(Self {
            model_id: model_id.into(),
            engine: Arc::new(engine),
            template,
            max_new_tokens: validate_token_budget(max_new_tokens)?,
        })
    }

    pub fn template(&self) -> &ChatTemplate {
        &self.template
    }

    fn render_all(&self, prompts: &[String], system_prompt: Option<&str>) -> Result<Vec<String>> {
        prompts
            .iter()
            .map(|p| self.template.render(&MessageSequence::assemble(p, system_prompt)))
            .collect()
    }
}

#[async_trait]
impl<E: GenerationEngine> ResponseGenerator for LocalBackend<E> {
    async fn generate_responses(
        &self,
        prompts: &[String],
        batch_size: usize,
        system_prompt: Option<&str>,
    ) -> GenResult<Vec<String>> {
        validate_request(prompts, batch_size)?;
        let start = Instant::now();

        let inputs = self
            .render_all(prompts, system_prompt)
            .map_err(LocalError::into_engine)?;

        let total_batches = inputs.len().div_ceil(batch_size);
        let max_new_tokens = self.max_new_tokens as usize;
        let mut responses = Vec::with_capacity(inputs.len());

        for (index, chunk) in inputs.chunks(batch_size).enumerate() {
            let batch_start = Instant::now();
            let engine = Arc::clone(&self.engine);
            let batch = chunk.to_vec();

            let outputs = tokio::task::spawn_blocking(move || engine.generate_batch(&batch, max_new_tokens))
                .await
                .map_err(|e| GenerationError::Engine(format!("batch task failed: {e}")))?
                .map_err(LocalError::into_engine)?;

            if outputs.len() != chunk.len() {
                return Err(GenerationError::Engine(format!(
                    "batch {} returned {} outputs for {} inputs",
                    index + 1,
                    outputs.len(),
                    chunk.len()
                )));
            }

            debug!(
                batch = index + 1,
                total = total_batches,
                size = chunk.len(),
                elapsed_ms = batch_start.elapsed().as_millis() as u64,
                "Generated batch"
            );
            responses.extend(outputs);
        }

        ensure_aligned(prompts, &responses)?;
        info!(
            model = %self.model_id,
            prompts = prompts.len(),
            batches = total_batches,
            elapsed_s = start.elapsed().as_secs_f32(),
            "Local generation complete"
        );
        Ok(responses)
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::Local
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn max_new_tokens(&self) -> u32 {
        self.max_new_tokens
    }
}
