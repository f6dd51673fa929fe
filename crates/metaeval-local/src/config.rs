//! Configuration for the local inference backend.

use std::path::PathBuf;

use candle_core::{DType, Device};
use serde::{Deserialize, Serialize};

/// Weight precision requested for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Bf16,
    F16,
    F32,
}

impl Precision {
    /// Half precision on CPU is slow and partly unsupported, so CPU always runs F32.
    pub fn dtype_for(&self, device: &Device) -> DType {
        if device.is_cpu() {
            return DType::F32;
        }
        match self {
            Precision::Bf16 => DType::BF16,
            Precision::F16  => DType::F16,
            Precision::F32  => DType::F32,
        }
    }
}

/// Configuration for a local causal language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelConfig {
    /// Hugging Face repo id, or a directory holding the same files
    pub model_id: String,

    /// Hub revision (branch, tag or commit)
    pub revision: Option<String>,

    /// Cache directory for downloaded models
    pub cache_dir: Option<PathBuf>,

    /// Token budget per response (default: 512)
    pub max_new_tokens: u32,

    /// Use GPU if available (default: true)
    pub use_gpu: bool,

    /// Weight precision on GPU (default: bf16)
    pub precision: Precision,

    /// Append the assistant-turn header after the user message (default: false)
    pub add_generation_prompt: bool,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            model_id: "meta-llama/Meta-Llama-3-8B-Instruct".to_string(),
            revision: None,
            cache_dir: None,
            max_new_tokens: 512,
            use_gpu: true,
            precision: Precision::Bf16,
            add_generation_prompt: false,
        }
    }
}

impl LocalModelConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Default::default()
        }
    }

    /// Create config for CPU-only inference.
    pub fn cpu(mut self) -> Self {
        self.use_gpu = false;
        self
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: u32) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_generation_prompt(mut self, enabled: bool) -> Self {
        self.add_generation_prompt = enabled;
        self
    }
}
