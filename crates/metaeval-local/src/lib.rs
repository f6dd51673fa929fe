//! metaeval local inference backend
//!
//! Pure Rust greedy generation with Candle (Hugging Face).
//! No Python dependency: models load straight from the Hugging Face Hub or
//! from a local directory with the same layout.
//!
//! # Features
//! - Llama-architecture causal LMs (Llama 2/3, Mistral, TinyLlama, ...)
//! - OLMo and OLMo 2 checkpoints from AllenAI
//! - The model's own Jinja chat template, rendered with minijinja
//! - GPU support (CUDA, Metal) with automatic fallback to CPU
//! - Batched, deterministic decoding: a response never depends on the batch size
//!
//! # Example
//! ```no_run
//! use metaeval_llm::ResponseGenerator;
//! use metaeval_local::{LocalBackend, LocalModelConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LocalModelConfig::new("TinyLlama/TinyLlama-1.1B-Chat-v1.0").cpu();
//!     let backend = LocalBackend::load(config).await?;
//!
//!     let prompts = vec!["Is 7 a prime number?".to_string()];
//!     let responses = backend.generate_responses(&prompts, 8, None).await?;
//!     println!("{}", responses[0]);
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod causal_lm;
pub mod config;
pub mod engine;
pub mod error;
pub mod hub;
pub mod template;

pub use backend::LocalBackend;
pub use causal_lm::{Architecture, CausalLmEngine};
pub use config::{LocalModelConfig, Precision};
pub use engine::GenerationEngine;
pub use error::{LocalError, Result};
pub use hub::ModelFiles;
pub use template::{ChatTemplate, SpecialTokens};
