use crate::config::{parse_duration, Config, SCHEMA_VERSION};
use crate::embedding::analyzer_language;
use crate::error::{RapportError, Result, ValidationError};

/// Longest tier window accepted, in days
const MAX_TIER_DAYS: i64 = 36_500;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_context(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RapportError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let mode = &config.embedding.mode;
        if mode != "local" && mode != "random" {
            errors.push(ValidationError::new(
                "embedding.mode",
                format!("Mode must be 'local' or 'random', got '{}'", mode),
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }

        if config.embedding.max_input_chars == 0 {
            errors.push(ValidationError::new(
                "embedding.max_input_chars",
                "Maximum input length must be greater than 0",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        Self::validate_duration("embedding.timeout", &config.embedding.timeout, errors);
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }

        if analyzer_language(&config.indexing.language).is_none() {
            errors.push(ValidationError::new(
                "indexing.language",
                format!("Unsupported stemming language: {}", config.indexing.language),
            ));
        }

        if config.indexing.highlight_chars < 20 {
            errors.push(ValidationError::new(
                "indexing.highlight_chars",
                "Highlight length must be at least 20 characters",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.rrf_k < 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("RRF k must not be negative, got {}", retrieval.rrf_k),
            ));
        }

        if retrieval.keyword_weight <= 0.0 || retrieval.semantic_weight <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.keyword_weight",
                "Fusion weights must be positive",
            ));
        }

        if retrieval.search_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.search_multiplier",
                "Search multiplier must be greater than 0",
            ));
        }

        if retrieval.filtered_overfetch == 0 {
            errors.push(ValidationError::new(
                "retrieval.filtered_overfetch",
                "Filtered over-fetch factor must be greater than 0",
            ));
        }

        if retrieval.default_limit == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_limit",
                "Default limit must be greater than 0",
            ));
        }
    }

    fn validate_context(config: &Config, errors: &mut Vec<ValidationError>) {
        let context = &config.context;

        if context.hot_tier_days <= 0 {
            errors.push(ValidationError::new(
                "context.hot_tier_days",
                "Hot tier window must be at least one day",
            ));
        }

        if context.warm_tier_days > MAX_TIER_DAYS {
            errors.push(ValidationError::new(
                "context.warm_tier_days",
                format!("Warm tier window must be at most {} days", MAX_TIER_DAYS),
            ));
        } else if context.warm_tier_days <= context.hot_tier_days {
            errors.push(ValidationError::new(
                "context.warm_tier_days",
                format!(
                    "Warm tier window ({}) must be longer than hot tier window ({})",
                    context.warm_tier_days, context.hot_tier_days
                ),
            ));
        }

        let limits = [
            ("context.hot_message_limit", context.hot_message_limit),
            ("context.hot_segment_limit", context.hot_segment_limit),
            ("context.warm_summary_limit", context.warm_summary_limit),
            ("context.relevant_limit", context.relevant_limit),
        ];
        for (path, value) in limits {
            if value == 0 {
                errors.push(ValidationError::new(path, "Limit must be greater than 0"));
            }
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.llm.enabled {
            // Local ollama servers take no key
            let env_var = &config.llm.api_key_env;
            match std::env::var(env_var) {
                _ if config.llm.provider == "ollama" => {}
                Ok(key) if key.is_empty() => errors.push(ValidationError::new(
                    "llm.api_key_env",
                    format!("Environment variable {} is empty", env_var),
                )),
                Ok(_) => {}
                Err(_) => errors.push(ValidationError::new(
                    "llm.api_key_env",
                    format!("Environment variable {} is not set", env_var),
                )),
            }

            if config.llm.base_url.is_empty() {
                errors.push(ValidationError::new(
                    "llm.base_url",
                    "Base URL cannot be empty when synthesis is enabled",
                ));
            }
        }

        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.llm.provider;
        let valid_providers = ["openai", "groq", "openrouter", "ollama"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        Self::validate_duration("llm.timeout", &config.llm.timeout, errors);
    }

    fn validate_duration(path: &str, value: &str, errors: &mut Vec<ValidationError>) {
        match parse_duration(value) {
            Some(d) if d.is_zero() => {
                errors.push(ValidationError::new(path, "Timeout must be greater than 0"))
            }
            Some(_) => {}
            None => errors.push(ValidationError::new(
                path,
                format!("Invalid duration format: {}", value),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn validation_paths(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(RapportError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_empty_data_dir() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::new();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_invalid_mode() {
        let mut config = Config::default();
        config.embedding.mode = "invalid".to_string();
        assert_eq!(validation_paths(&config), vec!["embedding.mode"]);
    }

    #[test]
    fn test_warm_window_must_exceed_hot_window() {
        let mut config = Config::default();
        config.context.warm_tier_days = 7;
        assert_eq!(validation_paths(&config), vec!["context.warm_tier_days"]);
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = Config::default();
        config.llm.timeout = "soon".to_string();
        config.indexing.language = "klingon".to_string();
        config.context.relevant_limit = 0;

        let paths = validation_paths(&config);
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&"llm.timeout".to_string()));
        assert!(paths.contains(&"indexing.language".to_string()));
        assert!(paths.contains(&"context.relevant_limit".to_string()));
    }

    #[test]
    fn test_enabled_llm_requires_api_key() {
        let mut config = Config::default();
        config.llm.enabled = true;
        config.llm.api_key_env = "RAPPORT_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        assert_eq!(validation_paths(&config), vec!["llm.api_key_env"]);
    }

    #[test]
    fn test_ollama_needs_no_api_key() {
        let mut config = Config::default();
        config.llm.enabled = true;
        config.llm.provider = "ollama".to_string();
        config.llm.api_key_env = "RAPPORT_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        assert!(validation_paths(&config).is_empty());
    }

    #[test]
    fn test_tier_windows_are_bounded() {
        let mut config = Config::default();
        config.context.warm_tier_days = i64::MAX;
        assert_eq!(validation_paths(&config), vec!["context.warm_tier_days"]);

        config.context.hot_tier_days = i64::MAX - 1;
        let paths = validation_paths(&config);
        assert!(paths.contains(&"context.warm_tier_days".to_string()));

        config.context.warm_tier_days = 36_500;
        config.context.hot_tier_days = 30;
        assert!(validation_paths(&config).is_empty());
    }
}
