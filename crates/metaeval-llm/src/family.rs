//! Backend families and identifier dispatch.
//!
//! Families are tried in a fixed priority order (OpenAI, Anthropic, Google,
//! local). The first matcher that accepts an identifier wins; a second match
//! is reported rather than silently ignored.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Google,
    Local,
}

impl ModelFamily {
    /// Dispatch priority.
    pub const ALL: [ModelFamily; 4] = [
        ModelFamily::OpenAi,
        ModelFamily::Anthropic,
        ModelFamily::Google,
        ModelFamily::Local,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::OpenAi    => "openai",
            ModelFamily::Anthropic => "anthropic",
            ModelFamily::Google    => "google",
            ModelFamily::Local     => "local",
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, ModelFamily::Local)
    }

    pub fn matches(&self, identifier: &str) -> bool {
        match self {
            ModelFamily::OpenAi    => identifier.contains("gpt"),
            ModelFamily::Anthropic => identifier.contains("claude"),
            ModelFamily::Google    => identifier.contains("gemini"),
            ModelFamily::Local     => is_local_model_name(identifier),
        }
    }

    /// Pick the family serving `identifier`.
    pub fn detect(identifier: &str) -> Result<ModelFamily> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(GenerationError::UnsupportedModel(identifier.to_string()));
        }

        let mut matching = Self::ALL.iter().copied().filter(|f| f.matches(identifier));
        let family = matching
            .next()
            .ok_or_else(|| GenerationError::UnsupportedModel(identifier.to_string()))?;

        let shadowed: Vec<&str> = matching.map(|f| f.as_str()).collect();
        if !shadowed.is_empty() {
            tracing::warn!(
                model = identifier,
                selected = family.as_str(),
                also_matched = ?shadowed,
                "Model identifier matches several families; set run.family to pick explicitly"
            );
        }

        Ok(family)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai"              => Ok(ModelFamily::OpenAi),
            "anthropic"           => Ok(ModelFamily::Anthropic),
            "google" | "gemini"   => Ok(ModelFamily::Google),
            "local" | "hf"        => Ok(ModelFamily::Local),
            other => Err(GenerationError::UnsupportedModel(format!("unknown backend family: {other}"))),
        }
    }
}

/// A Hugging Face repo id (`owner/name`) or a directory holding a model on disk.
fn is_local_model_name(identifier: &str) -> bool {
    if Path::new(identifier).is_dir() {
        return true;
    }
    let valid = |part: &str| {
        !part.is_empty()
            && part.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    match identifier.split_once('/') {
        Some((owner, name)) => valid(owner) && valid(name) && !name.contains('/'),
        None => false,
    }
}
