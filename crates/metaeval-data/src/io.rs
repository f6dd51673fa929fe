//! Reading datasets and writing generated responses.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DatasetError, Result};
use crate::schema::Dataset;

/// Load and validate a dataset file.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let dataset = Dataset::from_value(serde_json::from_str(&content)?)?;
    info!(
        path = %path.display(),
        instances = dataset.instances.len(),
        annotations = dataset.annotations.len(),
        "Loaded dataset"
    );
    Ok(dataset)
}

/// The response generated for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: u64,
    pub prompt: String,
    pub response: String,
}

/// Output document of one generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFile {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub max_new_tokens: u32,
    pub responses: Vec<ResponseRecord>,
}

impl ResponseFile {
    /// Pair instance ids and prompts with their responses, position by position.
    pub fn new(
        model: impl Into<String>,
        system_prompt: Option<String>,
        max_new_tokens: u32,
        ids: &[u64],
        prompts: Vec<String>,
        responses: Vec<String>,
    ) -> Result<Self> {
        if ids.len() != responses.len() || prompts.len() != responses.len() {
            return Err(DatasetError::LengthMismatch {
                instances: ids.len(),
                responses: responses.len(),
            });
        }
        let responses = ids
            .iter()
            .zip(prompts)
            .zip(responses)
            .map(|((&id, prompt), response)| ResponseRecord { id, prompt, response })
            .collect();
        Ok(Self { model: model.into(), system_prompt, max_new_tokens, responses })
    }

    /// Responses the provider declined to produce.
    pub fn empty_count(&self) -> usize {
        self.responses.iter().filter(|r| r.response.is_empty()).count()
    }
}

/// Write a response file as pretty JSON, creating parent directories.
pub fn write_responses(path: impl AsRef<Path>, file: &ResponseFile) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(file)?)?;
    info!(path = %path.display(), records = file.responses.len(), "Wrote responses");
    Ok(())
}
