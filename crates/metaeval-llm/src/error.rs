//! Error taxonomy shared by every generation backend.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerationError>;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The identifier matched no backend family.
    #[error("Unsupported model \"{0}\": not an OpenAI (gpt), Anthropic (claude), Google (gemini) or local model")]
    UnsupportedModel(String),

    /// Loading weights or building an authenticated client failed.
    #[error("Backend construction failed: {0}")]
    BackendConstruction(String),

    /// Local engine failure for a whole batch (OOM, template, decode).
    #[error("Generation engine error: {0}")]
    Engine(String),

    /// Network, authentication or protocol failure talking to a provider.
    #[error("Provider request failed: {0}")]
    ProviderRequest(String),

    #[error("Provider API error [{status}]: {message}")]
    ProviderStatus { status: u16, message: String },

    /// The provider declined to return text for one prompt.
    #[error("Content suppressed by provider: {reason}")]
    ContentSuppressed { reason: String },

    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),
}

impl GenerationError {
    /// Only content suppression is recovered per item; everything else ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GenerationError::ContentSuppressed { .. })
    }

    pub fn suppressed(reason: impl Into<String>) -> Self {
        GenerationError::ContentSuppressed { reason: reason.into() }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        GenerationError::ProviderRequest(e.to_string())
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(e: serde_json::Error) -> Self {
        GenerationError::ProviderRequest(format!("malformed response envelope: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_suppression_is_recoverable() {
        assert!(!GenerationError::suppressed("SAFETY").is_fatal());
        assert!(GenerationError::UnsupportedModel("x".into()).is_fatal());
        assert!(GenerationError::Engine("oom".into()).is_fatal());
        assert!(GenerationError::ProviderStatus { status: 401, message: "bad key".into() }.is_fatal());
    }
}
