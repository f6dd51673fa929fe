//! Decoder-only causal LMs on Candle: Llama/Mistral, OLMo and OLMo 2.

use std::time::Instant;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Llama, LlamaConfig};
use candle_transformers::models::{olmo, olmo2};
use serde_json::Value;
use tokenizers::{PaddingDirection, PaddingParams, PaddingStrategy, Tokenizer};
use tracing::{debug, info};

use crate::engine::GenerationEngine;
use crate::hub::ModelFiles;
use crate::template::SpecialTokens;
use crate::{LocalError, LocalModelConfig, Result};

/// Context length assumed when `config.json` does not declare one.
const DEFAULT_CONTEXT_LENGTH: usize = 2048;

/// Model families Candle can run here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    /// Llama 2/3, Mistral, TinyLlama and other Llama-layout checkpoints
    Llama,
    Olmo,
    Olmo2,
}

const SUPPORTED_ARCHITECTURES: [(&str, Architecture); 4] = [
    ("LlamaForCausalLM", Architecture::Llama),
    ("MistralForCausalLM", Architecture::Llama),
    ("OlmoForCausalLM", Architecture::Olmo),
    ("Olmo2ForCausalLM", Architecture::Olmo2),
];

impl Architecture {
    /// Read `architectures` from `config.json`, falling back to `model_type`
    /// for configs that omit the list.
    pub fn detect(config: &Value) -> Result<Self> {
        let architectures: Vec<&str> = config["architectures"]
            .as_array()
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let found = if architectures.is_empty() {
            match config["model_type"].as_str() {
                Some("llama" | "mistral") => Some(Self::Llama),
                Some("olmo") => Some(Self::Olmo),
                Some("olmo2") => Some(Self::Olmo2),
                _ => None,
            }
        } else {
            architectures.iter().find_map(|name| {
                SUPPORTED_ARCHITECTURES
                    .iter()
                    .find(|(supported, _)| supported == name)
                    .map(|&(_, arch)| arch)
            })
        };

        found.ok_or_else(|| {
            let supported: Vec<&str> = SUPPORTED_ARCHITECTURES.iter().map(|(name, _)| *name).collect();
            LocalError::UnsupportedArchitecture(format!("{architectures:?} (supported: {supported:?})"))
        })
    }
}

/// Where the padding token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadSource {
    Tokenizer,
    TokenizerConfig,
    ModelConfig,
    /// No pad token anywhere: end-of-sequence doubles as pad.
    Eos,
}

/// Loaded weights. Never run directly: each row decodes on its own copy.
enum Weights {
    /// Llama keeps its KV state outside the model; `cache` stays empty.
    Llama { model: Llama, cache: Cache },
    Olmo(olmo::Model),
    Olmo2(olmo2::Model),
}

impl Weights {
    fn load(arch: Architecture, config: &Value, vb: VarBuilder, device: &Device) -> Result<(Self, usize)> {
        let declared_context = config["max_position_embeddings"].as_u64().map(|n| n as usize);
        let weights = match arch {
            Architecture::Llama => {
                let llama_config: LlamaConfig = serde_json::from_value(config.clone())?;
                let llama_config = llama_config.into_config(false);
                let model = Llama::load(vb.clone(), &llama_config)
                    .map_err(|e| LocalError::ModelLoad(e.to_string()))?;
                // RoPE tables are computed once here and shared by every row
                let cache = Cache::new(true, vb.dtype(), &llama_config, device)?;
                let context = llama_config.max_position_embeddings;
                return Ok((Self::Llama { model, cache }, context));
            }
            Architecture::Olmo => {
                let olmo_config: olmo::Config = serde_json::from_value(config.clone())?;
                Self::Olmo(olmo::Model::new(&olmo_config, vb).map_err(|e| LocalError::ModelLoad(e.to_string()))?)
            }
            Architecture::Olmo2 => {
                let olmo_config: olmo2::Config = serde_json::from_value(config.clone())?;
                Self::Olmo2(olmo2::Model::new(&olmo_config, vb).map_err(|e| LocalError::ModelLoad(e.to_string()))?)
            }
        };
        Ok((weights, declared_context.unwrap_or(DEFAULT_CONTEXT_LENGTH)))
    }

    /// A decoder with fresh KV state sharing these weights.
    fn row(&self) -> RowDecoder<'_> {
        match self {
            Self::Llama { model, cache } => RowDecoder::Llama { model, cache: cache.clone() },
            Self::Olmo(model) => RowDecoder::Olmo(model.clone()),
            Self::Olmo2(model) => RowDecoder::Olmo2(model.clone()),
        }
    }
}

enum RowDecoder<'a> {
    Llama { model: &'a Llama, cache: Cache },
    Olmo(olmo::Model),
    Olmo2(olmo2::Model),
}

impl RowDecoder<'_> {
    /// Logits of the last input position as a flat `[vocab]` f32 tensor.
    fn next_logits(&mut self, input: &Tensor, index_pos: usize) -> Result<Tensor> {
        let logits = match self {
            Self::Llama { model, cache } => model.forward(input, index_pos, cache)?,
            Self::Olmo(model) => model.forward(input, index_pos)?,
            Self::Olmo2(model) => model.forward(input, index_pos)?,
        };
        let vocab = logits.dim(D::Minus1)?;
        let flat = logits.flatten_all()?;
        let len = flat.dim(0)?;
        Ok(flat.narrow(0, len - vocab, vocab)?.to_dtype(DType::F32)?)
    }
}

/// Greedy decoder for the supported checkpoints.
///
/// Inputs of one batch are tokenized together (left-padded to a common
/// length) and then decoded concurrently, one KV cache per row, so a row's
/// output never depends on which other rows share its batch.
pub struct CausalLmEngine {
    architecture: Architecture,
    weights: Weights,
    context_length: usize,
    tokenizer: Tokenizer,
    device: Device,
    eos_token_ids: Vec<u32>,
    pad_token_id: u32,
}

impl CausalLmEngine {
    pub fn load(files: &ModelFiles, settings: &LocalModelConfig) -> Result<Self> {
        let start = Instant::now();
        let device = select_device(settings)?;
        let dtype = settings.precision.dtype_for(&device);
        debug!("Using device {:?} with {:?}", device, dtype);

        let raw_config: Value = serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;
        let architecture = Architecture::detect(&raw_config)?;

        let special = match &files.tokenizer_config {
            Some(path) => SpecialTokens::from_tokenizer_config(&serde_json::from_str(
                &std::fs::read_to_string(path)?,
            )?),
            None => SpecialTokens::default(),
        };

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| LocalError::Tokenizer(e.to_string()))?;

        let mut eos_token_ids = config_eos_ids(&raw_config);
        if let Some(id) = special.eos.as_deref().and_then(|t| tokenizer.token_to_id(t)) {
            if !eos_token_ids.contains(&id) {
                eos_token_ids.push(id);
            }
        }
        let Some(&primary_eos) = eos_token_ids.first() else {
            return Err(LocalError::ModelLoad("no end-of-sequence token configured".to_string()));
        };

        let (pad_token_id, source) = resolve_pad_token(
            tokenizer.get_padding().map(|p| p.pad_id),
            special.pad.as_deref().and_then(|t| tokenizer.token_to_id(t)),
            raw_config["pad_token_id"].as_u64().map(|id| id as u32),
            primary_eos,
        );
        if source == PadSource::Eos {
            info!("Tokenizer has no pad token, reusing end-of-sequence token {pad_token_id}");
        }
        configure_padding(&mut tokenizer, pad_token_id)?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, dtype, &device)? };
        let (weights, context_length) = Weights::load(architecture, &raw_config, vb, &device)?;
        info!(
            architecture = ?architecture,
            context_length,
            "Model loaded in {:.2}s",
            start.elapsed().as_secs_f32()
        );

        Ok(Self {
            architecture,
            weights,
            context_length,
            tokenizer,
            device,
            eos_token_ids,
            pad_token_id,
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self.device, Device::Cuda(_) | Device::Metal(_))
    }

    /// Greedy decoding of one row. Returns only the new tokens, decoded.
    fn decode_greedy(&self, prompt_ids: &[u32], max_new_tokens: usize) -> Result<String> {
        if prompt_ids.is_empty() {
            return Err(LocalError::InvalidInput("prompt is empty after tokenization".to_string()));
        }
        let limit = self.context_length;
        if prompt_ids.len() >= limit {
            return Err(LocalError::InvalidInput(format!(
                "prompt of {} tokens exceeds the model context of {limit}",
                prompt_ids.len()
            )));
        }
        let budget = max_new_tokens.min(limit - prompt_ids.len());

        let mut decoder = self.weights.row();
        let mut context = prompt_ids.to_vec();
        let mut index_pos = 0;
        let mut generated = Vec::with_capacity(budget);

        for _ in 0..budget {
            let input = Tensor::new(context.as_slice(), &self.device)?.unsqueeze(0)?;
            let logits = decoder.next_logits(&input, index_pos)?;
            index_pos += context.len();

            let next = logits.argmax(D::Minus1)?.to_scalar::<u32>()?;
            if self.eos_token_ids.contains(&next) {
                break;
            }
            generated.push(next);
            context = vec![next];
        }

        self.tokenizer
            .decode(&generated, true)
            .map_err(|e| LocalError::Tokenizer(e.to_string()))
    }
}

impl GenerationEngine for CausalLmEngine {
    fn generate_batch(&self, inputs: &[String], max_new_tokens: usize) -> Result<Vec<String>> {
        let rows = encode_unpadded(&self.tokenizer, inputs)?;
        decode_rows(&rows, |ids| self.decode_greedy(ids, max_new_tokens))
    }
}

/// Left padding to the longest row of a batch, no truncation.
fn configure_padding(tokenizer: &mut Tokenizer, pad_token_id: u32) -> Result<()> {
    let pad_token = tokenizer.id_to_token(pad_token_id).unwrap_or_default();
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        direction: PaddingDirection::Left,
        pad_id: pad_token_id,
        pad_token,
        ..Default::default()
    }));
    tokenizer
        .with_truncation(None)
        .map_err(|e| LocalError::Tokenizer(e.to_string()))?;
    Ok(())
}

/// Tokenize a batch together and drop each row's padding. Rows keep input order.
fn encode_unpadded(tokenizer: &Tokenizer, inputs: &[String]) -> Result<Vec<Vec<u32>>> {
    let texts: Vec<&str> = inputs.iter().map(String::as_str).collect();
    // Templates already carry the special tokens
    let encodings = tokenizer
        .encode_batch(texts, false)
        .map_err(|e| LocalError::Tokenizer(e.to_string()))?;

    Ok(encodings
        .iter()
        .map(|enc| strip_padding(enc.get_ids(), enc.get_attention_mask()))
        .collect())
}

/// Run `decode` on every row, each on its own scoped thread. The first
/// failing row, in row order, fails the batch.
fn decode_rows<F>(rows: &[Vec<u32>], decode: F) -> Result<Vec<String>>
where
    F: Fn(&[u32]) -> Result<String> + Sync,
{
    let decode = &decode;
    std::thread::scope(|scope| {
        let handles: Vec<_> = rows
            .iter()
            .map(|ids| scope.spawn(move || decode(ids.as_slice())))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| LocalError::Inference("decode thread panicked".to_string()))?
            })
            .collect()
    })
}

/// `eos_token_id` from `config.json`: a single id or a list.
fn config_eos_ids(config: &Value) -> Vec<u32> {
    match &config["eos_token_id"] {
        Value::Number(id) => id.as_u64().map(|id| vec![id as u32]).unwrap_or_default(),
        Value::Array(ids) => ids.iter().filter_map(Value::as_u64).map(|id| id as u32).collect(),
        _ => Vec::new(),
    }
}

/// Pick the pad token: the tokenizer's own, then the declared one, then the
/// model config's, and finally end-of-sequence.
pub fn resolve_pad_token(
    tokenizer_pad: Option<u32>,
    declared_pad: Option<u32>,
    config_pad: Option<u32>,
    eos: u32,
) -> (u32, PadSource) {
    tokenizer_pad
        .map(|id| (id, PadSource::Tokenizer))
        .or_else(|| declared_pad.map(|id| (id, PadSource::TokenizerConfig)))
        .or_else(|| config_pad.map(|id| (id, PadSource::ModelConfig)))
        .unwrap_or((eos, PadSource::Eos))
}

/// Drop left-padding positions (attention mask 0).
fn strip_padding(ids: &[u32], attention_mask: &[u32]) -> Vec<u32> {
    ids.iter()
        .zip(attention_mask)
        .filter(|(_, &mask)| mask == 1)
        .map(|(&id, _)| id)
        .collect()
}

/// Select the best available device.
fn select_device(config: &LocalModelConfig) -> Result<Device> {
    if !config.use_gpu {
        return Ok(Device::Cpu);
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("CUDA device available");
                return Ok(device);
            }
            Err(e) => {
                debug!("CUDA not available: {}, falling back to CPU", e);
            }
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Metal device available");
                return Ok(device);
            }
            Err(e) => {
                debug!("Metal not available: {}, falling back to CPU", e);
            }
        }
    }

    Ok(Device::Cpu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Whitespace-split word-level tokenizer over a five-word vocabulary.
    const WORD_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"<pad>": 0, "<unk>": 1, "a": 2, "b": 3, "c": 4},
            "unk_token": "<unk>"
        }
    }"#;

    fn word_tokenizer() -> Tokenizer {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, WORD_TOKENIZER).unwrap();
        let mut tokenizer = Tokenizer::from_file(&path).unwrap();
        configure_padding(&mut tokenizer, 0).unwrap();
        tokenizer
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pad_token_falls_back_to_eos() {
        assert_eq!(resolve_pad_token(None, None, None, 2), (2, PadSource::Eos));
    }

    #[test]
    fn test_pad_token_precedence() {
        assert_eq!(resolve_pad_token(Some(0), Some(5), Some(7), 2), (0, PadSource::Tokenizer));
        assert_eq!(resolve_pad_token(None, Some(5), Some(7), 2), (5, PadSource::TokenizerConfig));
        assert_eq!(resolve_pad_token(None, None, Some(7), 2), (7, PadSource::ModelConfig));
    }

    #[test]
    fn test_strip_left_padding() {
        assert_eq!(strip_padding(&[2, 2, 10, 11], &[0, 0, 1, 1]), vec![10, 11]);
        assert_eq!(strip_padding(&[10, 11], &[1, 1]), vec![10, 11]);
    }

    #[test]
    fn test_batch_encoding_pads_left_to_longest() {
        let tokenizer = word_tokenizer();
        let encodings = tokenizer.encode_batch(vec!["a b c", "a"], false).unwrap();
        assert_eq!(encodings[1].get_ids(), &[0, 0, 2]);
        assert_eq!(encodings[1].get_attention_mask(), &[0, 0, 1]);
    }

    #[test]
    fn test_encoded_rows_are_unpadded_in_input_order() {
        let tokenizer = word_tokenizer();
        let rows = encode_unpadded(&tokenizer, &strings(&["a b c", "a", "c a"])).unwrap();
        assert_eq!(rows, vec![vec![2, 3, 4], vec![2], vec![4, 2]]);
    }

    #[test]
    fn test_row_encoding_does_not_depend_on_batch_mates() {
        let tokenizer = word_tokenizer();
        let alone = encode_unpadded(&tokenizer, &strings(&["b"])).unwrap();
        let batched = encode_unpadded(&tokenizer, &strings(&["a b c a b", "b"])).unwrap();
        assert_eq!(alone[0], batched[1]);
    }

    #[test]
    fn test_decoded_rows_keep_row_order() {
        let rows = vec![vec![4, 2], vec![3], vec![2, 3, 4]];
        let out = decode_rows(&rows, |ids| {
            Ok(ids.iter().map(u32::to_string).collect::<Vec<_>>().join(","))
        })
        .unwrap();
        assert_eq!(out, strings(&["4,2", "3", "2,3,4"]));
    }

    #[test]
    fn test_failing_row_fails_the_batch() {
        let rows = vec![vec![2], vec![], vec![3]];
        let result = decode_rows(&rows, |ids| {
            if ids.is_empty() {
                Err(LocalError::InvalidInput("empty row".to_string()))
            } else {
                Ok(String::new())
            }
        });
        assert!(matches!(result, Err(LocalError::InvalidInput(_))));
    }

    #[test]
    fn test_architecture_detection() {
        for (config, expected) in [
            (json!({"architectures": ["LlamaForCausalLM"]}), Architecture::Llama),
            (json!({"architectures": ["MistralForCausalLM"]}), Architecture::Llama),
            (json!({"architectures": ["OlmoForCausalLM"]}), Architecture::Olmo),
            (json!({"architectures": ["Olmo2ForCausalLM"]}), Architecture::Olmo2),
            (json!({"model_type": "mistral"}), Architecture::Llama),
            (json!({"model_type": "olmo"}), Architecture::Olmo),
            (json!({"model_type": "olmo2"}), Architecture::Olmo2),
        ] {
            assert_eq!(Architecture::detect(&config).unwrap(), expected, "{config}");
        }
    }

    #[test]
    fn test_unknown_architecture_rejected() {
        assert!(matches!(
            Architecture::detect(&json!({"architectures": ["GPT2LMHeadModel"]})),
            Err(LocalError::UnsupportedArchitecture(ref m)) if m.contains("OlmoForCausalLM")
        ));
        assert!(matches!(
            Architecture::detect(&json!({"model_type": "gpt2"})),
            Err(LocalError::UnsupportedArchitecture(_))
        ));
    }

    #[test]
    fn test_eos_ids_single_or_list() {
        assert_eq!(config_eos_ids(&json!({"eos_token_id": 50279})), vec![50279]);
        assert_eq!(config_eos_ids(&json!({"eos_token_id": [128001, 128009]})), vec![128001, 128009]);
        assert!(config_eos_ids(&json!({"eos_token_id": null})).is_empty());
    }

    #[test]
    #[ignore] // Downloads a model from the Hugging Face Hub
    fn test_tiny_llama_greedy_is_deterministic() {
        let config = LocalModelConfig::new("TinyLlama/TinyLlama-1.1B-Chat-v1.0")
            .cpu()
            .with_max_new_tokens(8);
        let files = ModelFiles::resolve(&config).unwrap();
        let engine = CausalLmEngine::load(&files, &config).unwrap();
        assert_eq!(engine.architecture(), Architecture::Llama);

        let inputs = vec!["<|user|>\nName a prime number.</s>\n<|assistant|>\n".to_string()];
        let a = engine.generate_batch(&inputs, 8).unwrap();
        let b = engine.generate_batch(&inputs, 8).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
    }

    #[test]
    #[ignore] // Downloads a model from the Hugging Face Hub
    fn test_olmo_batch_matches_single_rows() {
        let config = LocalModelConfig::new("allenai/OLMo-1B-hf").cpu().with_max_new_tokens(6);
        let files = ModelFiles::resolve(&config).unwrap();
        let engine = CausalLmEngine::load(&files, &config).unwrap();
        assert_eq!(engine.architecture(), Architecture::Olmo);

        let inputs = strings(&["The capital of France is", "2 + 2 ="]);
        let batched = engine.generate_batch(&inputs, 6).unwrap();
        let single = engine.generate_batch(&inputs[1..], 6).unwrap();
        assert_eq!(batched[1], single[0]);
    }
}
