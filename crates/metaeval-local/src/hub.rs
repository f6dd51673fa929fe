//! Locating model files on the Hugging Face Hub or on disk.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use tracing::info;

use crate::{LocalError, LocalModelConfig, Result};

const WEIGHTS_INDEX: &str = "model.safetensors.index.json";
const SINGLE_WEIGHTS: &str = "model.safetensors";

/// Files needed to run a causal LM.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub tokenizer_config: Option<PathBuf>,
    /// Standalone template file; takes precedence over `tokenizer_config.json`.
    pub chat_template: Option<PathBuf>,
    pub weights: Vec<PathBuf>,
}

impl ModelFiles {
    /// Resolve from a local directory if `model_id` names one, else download from the Hub.
    pub fn resolve(config: &LocalModelConfig) -> Result<Self> {
        let dir = Path::new(&config.model_id);
        if dir.is_dir() {
            info!("Loading model files from {}", dir.display());
            return Self::from_dir(dir);
        }

        let mut builder = ApiBuilder::new().with_progress(false);
        if let Some(cache_dir) = &config.cache_dir {
            builder = builder.with_cache_dir(cache_dir.clone());
        }
        let api = builder
            .build()
            .map_err(|e| LocalError::Download(format!("API init: {e}")))?;

        let repo = match &config.revision {
            Some(rev) => Repo::with_revision(config.model_id.clone(), RepoType::Model, rev.clone()),
            None => Repo::new(config.model_id.clone(), RepoType::Model),
        };
        let api_repo = api.repo(repo);

        info!("Fetching {} from the Hugging Face Hub", config.model_id);
        let listing: HashSet<String> = api_repo
            .info()
            .map_err(|e| LocalError::Download(format!("listing {}: {e}", config.model_id)))?
            .siblings
            .into_iter()
            .map(|s| s.rfilename)
            .collect();

        Self::gather(
            |name| listing.contains(name),
            |name| {
                api_repo
                    .get(name)
                    .map_err(|e| LocalError::Download(format!("{name}: {e}")))
            },
        )
    }

    pub fn from_dir(dir: &Path) -> Result<Self> {
        Self::gather(
            |name| dir.join(name).is_file(),
            |name| {
                let path = dir.join(name);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(LocalError::ModelLoad(format!("{} has no {name}", dir.display())))
                }
            },
        )
    }

    /// Optional files are fetched only when `exists` lists them; every fetch
    /// error propagates.
    fn gather<E, F>(exists: E, fetch: F) -> Result<Self>
    where
        E: Fn(&str) -> bool,
        F: Fn(&str) -> Result<PathBuf>,
    {
        let optional = |name: &str| exists(name).then(|| fetch(name)).transpose();

        let config = fetch("config.json")?;
        let tokenizer = fetch("tokenizer.json")?;
        let tokenizer_config = optional("tokenizer_config.json")?;
        let chat_template = optional("chat_template.jinja")?;

        let weights = match optional(WEIGHTS_INDEX)? {
            Some(index) => shard_names(&index)?
                .iter()
                .map(|shard| fetch(shard.as_str()))
                .collect::<Result<Vec<_>>>()?,
            None => match optional(SINGLE_WEIGHTS)? {
                Some(path) => vec![path],
                None => {
                    return Err(LocalError::ModelLoad(format!(
                        "no {SINGLE_WEIGHTS} or {WEIGHTS_INDEX} found"
                    )))
                }
            },
        };

        Ok(Self { config, tokenizer, tokenizer_config, chat_template, weights })
    }
}

/// Distinct shard file names listed in a safetensors index, in sorted order.
fn shard_names(index_path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(index_path)?;
    let json: serde_json::Value = serde_json::from_str(&content)?;
    let weight_map = json["weight_map"].as_object().ok_or_else(|| {
        LocalError::ModelLoad(format!("{} has no weight_map", index_path.display()))
    })?;

    let shards: BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    Ok(shards.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn touch(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_single_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "config.json", "{}");
        touch(dir.path(), "tokenizer.json", "{}");
        touch(dir.path(), "tokenizer_config.json", "{}");
        touch(dir.path(), "model.safetensors", "");

        let files = ModelFiles::from_dir(dir.path()).unwrap();
        assert_eq!(files.weights, vec![dir.path().join("model.safetensors")]);
        assert!(files.tokenizer_config.is_some());
        assert!(files.chat_template.is_none());
    }

    #[test]
    fn test_sharded_layout_lists_each_shard_once() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "config.json", "{}");
        touch(dir.path(), "tokenizer.json", "{}");
        touch(dir.path(), "model-00002-of-00002.safetensors", "");
        touch(dir.path(), "model-00001-of-00002.safetensors", "");
        touch(
            dir.path(),
            WEIGHTS_INDEX,
            r#"{"weight_map": {
                "lm_head.weight": "model-00002-of-00002.safetensors",
                "model.embed_tokens.weight": "model-00001-of-00002.safetensors",
                "model.norm.weight": "model-00002-of-00002.safetensors"
            }}"#,
        );

        let files = ModelFiles::from_dir(dir.path()).unwrap();
        assert_eq!(
            files.weights,
            vec![
                dir.path().join("model-00001-of-00002.safetensors"),
                dir.path().join("model-00002-of-00002.safetensors"),
            ]
        );
        assert!(files.tokenizer_config.is_none());
    }

    #[test]
    fn test_fetch_failure_of_listed_optional_file_propagates() {
        let listed = ["config.json", "tokenizer.json", "tokenizer_config.json", SINGLE_WEIGHTS];
        let result = ModelFiles::gather(
            |name| listed.contains(&name),
            |name| match name {
                "tokenizer_config.json" => Err(LocalError::Download("401 Unauthorized".to_string())),
                _ => Ok(PathBuf::from(name)),
            },
        );
        assert!(matches!(result, Err(LocalError::Download(ref m)) if m.contains("401")));
    }

    #[test]
    fn test_index_fetch_failure_does_not_fall_back_to_single_file() {
        let listed = ["config.json", "tokenizer.json", WEIGHTS_INDEX, SINGLE_WEIGHTS];
        let result = ModelFiles::gather(
            |name| listed.contains(&name),
            |name| {
                if name == WEIGHTS_INDEX {
                    Err(LocalError::Download("connection reset".to_string()))
                } else {
                    Ok(PathBuf::from(name))
                }
            },
        );
        assert!(matches!(result, Err(LocalError::Download(_))));
    }

    #[test]
    fn test_unlisted_optional_files_are_not_fetched() {
        let listed = ["config.json", "tokenizer.json", SINGLE_WEIGHTS];
        let files = ModelFiles::gather(
            |name| listed.contains(&name),
            |name| {
                assert!(listed.contains(&name), "fetched unlisted {name}");
                Ok(PathBuf::from(name))
            },
        )
        .unwrap();
        assert_eq!(files.weights, vec![PathBuf::from(SINGLE_WEIGHTS)]);
        assert!(files.tokenizer_config.is_none());
        assert!(files.chat_template.is_none());
    }

    #[test]
    fn test_missing_weights_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "config.json", "{}");
        touch(dir.path(), "tokenizer.json", "{}");
        assert!(matches!(ModelFiles::from_dir(dir.path()), Err(LocalError::ModelLoad(_))));
    }
}
