//! Error types for the local inference backend.

use metaeval_llm::GenerationError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LocalError>;

#[derive(Error, Debug)]
pub enum LocalError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Chat template error: {0}")]
    Template(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Model download failed: {0}")]
    Download(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LocalError {
    /// Failure while acquiring the model: fatal to the run before any prompt is seen.
    pub fn into_construction(self) -> GenerationError {
        GenerationError::BackendConstruction(self.to_string())
    }

    /// Failure while generating a batch.
    pub fn into_engine(self) -> GenerationError {
        GenerationError::Engine(self.to_string())
    }
}

impl From<candle_core::Error> for LocalError {
    fn from(e: candle_core::Error) -> Self {
        LocalError::Inference(e.to_string())
    }
}

impl From<tokenizers::Error> for LocalError {
    fn from(e: tokenizers::Error) -> Self {
        LocalError::Tokenizer(e.to_string())
    }
}

impl From<hf_hub::api::sync::ApiError> for LocalError {
    fn from(e: hf_hub::api::sync::ApiError) -> Self {
        LocalError::Download(e.to_string())
    }
}

impl From<minijinja::Error> for LocalError {
    fn from(e: minijinja::Error) -> Self {
        LocalError::Template(e.to_string())
    }
}
