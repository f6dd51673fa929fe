//! Configuration loading for metaeval.
//! Reads metaeval.toml from the path given on the command line (or in
//! METAEVAL_CONFIG), else from the current directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use metaeval_llm::{ModelFamily, ProviderConfig};
use metaeval_local::{LocalModelConfig, Precision};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

const DEFAULT_CONFIG_FILE: &str = "metaeval.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub local: LocalConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub model: Option<String>,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub system_prompt: Option<String>,
    /// Skip identifier matching and use this family.
    pub family: Option<ModelFamily>,
}

fn default_max_new_tokens() -> u32   { 512 }
fn default_batch_size()     -> usize { 8 }

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_new_tokens: default_max_new_tokens(),
            batch_size: default_batch_size(),
            system_prompt: None,
            family: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderSettings,
    #[serde(default)]
    pub anthropic: ProviderSettings,
    #[serde(default)]
    pub google: ProviderSettings,
}

impl ProvidersConfig {
    pub fn get(&self, family: ModelFamily) -> Option<&ProviderSettings> {
        match family {
            ModelFamily::OpenAi    => Some(&self.openai),
            ModelFamily::Anthropic => Some(&self.anthropic),
            ModelFamily::Google    => Some(&self.google),
            ModelFamily::Local     => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderSettings {
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub request_delay_ms: u64,
}

impl ProviderSettings {
    /// `None` when no key is configured.
    pub fn provider_config(&self) -> Option<ProviderConfig> {
        let key = self.api_key.as_ref()?;
        let mut config = ProviderConfig::new(key.expose_secret())
            .with_request_delay(Duration::from_millis(self.request_delay_ms));
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.clone());
        }
        Some(config)
    }
}

fn deserialize_secret<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SecretString>, D::Error> {
    Ok(Option::<String>::deserialize(d)?
        .filter(|k| !k.trim().is_empty())
        .map(SecretString::from))
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    pub revision: Option<String>,
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "bool_true")]
    pub use_gpu: bool,
    #[serde(default)]
    pub precision: Precision,
    #[serde(default)]
    pub add_generation_prompt: bool,
}

fn bool_true() -> bool { true }

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            revision: None,
            cache_dir: None,
            use_gpu: true,
            precision: Precision::default(),
            add_generation_prompt: false,
        }
    }
}

impl LocalConfig {
    pub fn model_config(&self, model_id: &str, max_new_tokens: u32) -> LocalModelConfig {
        LocalModelConfig {
            model_id: model_id.to_string(),
            revision: self.revision.clone(),
            cache_dir: self.cache_dir.clone(),
            max_new_tokens,
            use_gpu: self.use_gpu,
            precision: self.precision,
            add_generation_prompt: self.add_generation_prompt,
        }
    }
}

/// Environment variable consulted when a provider section has no `api_key`.
pub fn api_key_env(family: ModelFamily) -> Option<&'static str> {
    match family {
        ModelFamily::OpenAi    => Some("OPENAI_API_KEY"),
        ModelFamily::Anthropic => Some("ANTHROPIC_API_KEY"),
        ModelFamily::Google    => Some("GOOGLE_API_KEY"),
        ModelFamily::Local     => None,
    }
}

impl Config {
    /// Load configuration. An explicit path must exist; the default
    /// `./metaeval.toml` is optional and defaults apply without it.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Self::from_toml(&std::fs::read_to_string(path)?)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_toml(&std::fs::read_to_string(DEFAULT_CONFIG_FILE)?)?
            }
            None => {
                tracing::info!("No {DEFAULT_CONFIG_FILE} found, using defaults");
                Self::default()
            }
        };
        config.fill_api_keys(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Fill missing provider keys from `lookup` (the process environment at load time).
    pub fn fill_api_keys(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (family, settings) in [
            (ModelFamily::OpenAi, &mut self.providers.openai),
            (ModelFamily::Anthropic, &mut self.providers.anthropic),
            (ModelFamily::Google, &mut self.providers.google),
        ] {
            if settings.api_key.is_some() {
                continue;
            }
            settings.api_key = api_key_env(family)
                .and_then(&lookup)
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from);
        }
    }
}

mod tests;
