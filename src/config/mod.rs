//! Configuration management for rapport
//!
//! Handles loading, validation, profile overrides and environment overrides
//! for the retrieval and context engine.

use crate::error::{RapportError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Supported configuration schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the SQLite database and the keyword index
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// `data_dir` with a leading `~` expanded to the home directory
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.data_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolved_data_dir().join("rapport.sqlite")
    }

    pub fn keyword_index_path(&self) -> PathBuf {
        self.resolved_data_dir().join("keywords")
    }
}

/// Expand tilde in path
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "local" (FastEmbed model) or "random" (deterministic fallback)
    pub mode: String,
    pub model: String,
    pub dimension: usize,
    /// Inputs longer than this many characters are truncated before embedding
    pub max_input_chars: usize,
    pub batch_size: usize,
    pub timeout: String,
}

/// Keyword and vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub hnsw_ef_construction: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_search: usize,
    /// Stemming language for the full-text analyzer
    pub language: String,
    /// Maximum length of a full-text highlight excerpt
    pub highlight_chars: usize,
}

/// Hybrid retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// RRF K constant
    pub rrf_k: f32,
    pub keyword_weight: f32,
    pub semantic_weight: f32,
    /// Each provider is asked for `limit * search_multiplier` candidates
    pub search_multiplier: usize,
    /// Over-fetch factor for filtered vector queries
    pub filtered_overfetch: usize,
    pub default_limit: usize,
}

/// Tier windows and caps for context assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    pub hot_tier_days: i64,
    pub warm_tier_days: i64,
    pub hot_message_limit: usize,
    pub hot_segment_limit: usize,
    pub warm_summary_limit: usize,
    pub cold_milestone_limit: usize,
    pub cold_decision_limit: usize,
    pub relevant_limit: usize,
}

/// LLM configuration for context synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: String,
    /// OpenAI-compatible API root, e.g. "https://api.openai.com/v1"
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: String,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RapportError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RapportError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RapportError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| RapportError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(mode) = overrides.embedding_mode {
            self.embedding.mode = mode;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(enabled) = overrides.llm_enabled {
            self.llm.enabled = enabled;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: RAPPORT_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("RAPPORT_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LLM__ENABLED" => self.llm.enabled = parse_env_value(path, value)?,
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__BASE_URL" => self.llm.base_url = value.to_string(),
            "LLM__TIMEOUT" => self.llm.timeout = value.to_string(),
            "EMBEDDING__MODE" => self.embedding.mode = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "CONTEXT__HOT_TIER_DAYS" => self.context.hot_tier_days = parse_env_value(path, value)?,
            "CONTEXT__WARM_TIER_DAYS" => {
                self.context.warm_tier_days = parse_env_value(path, value)?
            }
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Timeout applied to each embedding call
    pub fn embedding_timeout(&self) -> Result<Duration> {
        parse_duration(&self.embedding.timeout).ok_or_else(|| RapportError::InvalidConfigValue {
            path: "embedding.timeout".to_string(),
            message: format!("Invalid duration: {}", self.embedding.timeout),
        })
    }

    /// Timeout applied to each synthesis call
    pub fn llm_timeout(&self) -> Result<Duration> {
        parse_duration(&self.llm.timeout).ok_or_else(|| RapportError::InvalidConfigValue {
            path: "llm.timeout".to_string(),
            message: format!("Invalid duration: {}", self.llm.timeout),
        })
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RapportError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("rapport").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| RapportError::Config("Cannot determine data directory".to_string()))?;

        Ok(data_dir.join("rapport"))
    }
}

fn parse_env_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| RapportError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Parse duration strings like "500ms", "10s", "2m", "1h". Bare numbers are seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (number, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = number.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        "h" => value.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "offline".to_string(),
            ProfileOverrides {
                embedding_mode: Some("random".to_string()),
                embedding_model: None,
                llm_enabled: Some(false),
                llm_model: None,
            },
        );

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.local/share/rapport"),
            },
            embedding: EmbeddingConfig::default(),
            indexing: IndexingConfig::default(),
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
            llm: LlmConfig::default(),
            profiles,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: "local".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            max_input_chars: 8000,
            batch_size: 32,
            timeout: "10s".to_string(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            hnsw_ef_construction: 200,
            hnsw_m: 16,
            hnsw_ef_search: 64,
            language: "english".to_string(),
            highlight_chars: 160,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            keyword_weight: 1.0,
            semantic_weight: 1.0,
            search_multiplier: 2,
            filtered_overfetch: 10,
            default_limit: 20,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            hot_tier_days: 7,
            warm_tier_days: 90,
            hot_message_limit: 50,
            hot_segment_limit: 30,
            warm_summary_limit: 10,
            cold_milestone_limit: 3,
            cold_decision_limit: 5,
            relevant_limit: 5,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 1200,
            timeout: "30s".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_paths_expand_tilde() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/var/lib/rapport"),
        };
        assert_eq!(
            storage.database_path(),
            PathBuf::from("/var/lib/rapport/rapport.sqlite")
        );

        let storage = StorageConfig {
            data_dir: PathBuf::from("~/rapport"),
        };
        if let Some(home) = dirs::home_dir() {
            assert_eq!(storage.keyword_index_path(), home.join("rapport/keywords"));
        }
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("15"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("10d"), None);
        assert_eq!(parse_duration(&format!("{}h", u64::MAX)), None);
        assert_eq!(parse_duration(&format!("{}m", u64::MAX / 2)), None);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.context.hot_tier_days = 3;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.context.hot_tier_days, 3);
        assert_eq!(loaded.retrieval.rrf_k, 60.0);
        assert!(loaded.profiles.contains_key("offline"));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/rapport/config.toml"));
        assert!(matches!(result, Err(RapportError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_apply_offline_profile() {
        let mut config = Config::default();
        config.llm.enabled = true;
        config.apply_profile("offline").unwrap();

        assert_eq!(config.embedding.mode, "random");
        assert!(!config.llm.enabled);
    }

    #[test]
    fn test_unknown_profile() {
        let mut config = Config::default();
        assert!(config.apply_profile("turbo").is_err());
    }

    #[test]
    fn test_timeouts() {
        let config = Config::default();
        assert_eq!(config.embedding_timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(config.llm_timeout().unwrap(), Duration::from_secs(30));
    }
}
