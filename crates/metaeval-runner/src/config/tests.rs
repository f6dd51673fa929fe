#[cfg(test)]
mod tests {
    use super::super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.run.max_new_tokens, 512);
        assert_eq!(config.run.batch_size, 8);
        assert!(config.run.model.is_none());
        assert!(config.local.use_gpu);
        assert!(!config.local.add_generation_prompt);
        assert_eq!(config.local.precision, Precision::Bf16);
        assert_eq!(config.providers.google.request_delay_ms, 0);
    }

    #[test]
    fn test_full_file() {
        let config = Config::from_toml(
            r#"
            [run]
            model = "openai-community/gpt2"
            family = "local"
            batch_size = 4
            system_prompt = "Think step by step."

            [providers.google]
            api_key = "g-key"
            request_delay_ms = 1000

            [local]
            use_gpu = false
            precision = "f16"
            cache_dir = "/tmp/hf"
            "#,
        )
        .unwrap();

        assert_eq!(config.run.family, Some(ModelFamily::Local));
        assert_eq!(config.run.batch_size, 4);
        assert_eq!(config.run.max_new_tokens, 512);
        assert_eq!(config.local.precision, Precision::F16);

        let google = config.providers.google.provider_config().unwrap();
        assert_eq!(google.api_key.expose_secret(), "g-key");
        assert_eq!(google.request_delay, Some(Duration::from_millis(1000)));
        assert!(config.providers.openai.provider_config().is_none());

        let local = config.local.model_config("openai-community/gpt2", 64);
        assert_eq!(local.max_new_tokens, 64);
        assert!(!local.use_gpu);
        assert_eq!(local.cache_dir, Some(PathBuf::from("/tmp/hf")));
    }

    #[test]
    fn test_env_keys_fill_only_missing_entries() {
        let mut config = Config::from_toml(
            r#"
            [providers.openai]
            api_key = "from-file"
            "#,
        )
        .unwrap();
        config.fill_api_keys(|name| match name {
            "OPENAI_API_KEY" => Some("from-env".to_string()),
            "ANTHROPIC_API_KEY" => Some("anthropic-env".to_string()),
            _ => None,
        });

        let openai = config.providers.openai.api_key.as_ref().unwrap();
        assert_eq!(openai.expose_secret(), "from-file");
        let anthropic = config.providers.anthropic.api_key.as_ref().unwrap();
        assert_eq!(anthropic.expose_secret(), "anthropic-env");
        assert!(config.providers.google.api_key.is_none());
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let config = Config::from_toml("[providers.anthropic]\napi_key = \"  \"\n").unwrap();
        assert!(config.providers.anthropic.api_key.is_none());
    }

    #[test]
    fn test_unknown_family_rejected() {
        assert!(Config::from_toml("[run]\nfamily = \"cohere\"\n").is_err());
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Config::load(Some(path.as_path())).is_err());
    }
}
