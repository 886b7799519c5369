//! Configuration loading for the memory system.
//!
//! Layered config: defaults -> config file -> env vars -> legacy env overrides.
//! Config file lives at ~/.config/slarglebart/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::error::MemoryError;

/// Default embedding model (384 dimensions)
pub const DEFAULT_EMBEDDING_MODEL: &str = "intfloat/e5-small-v2";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Default primary memory index
pub const DEFAULT_MEMORY_INDEX: &str = "slarglebart_memories_v2";

/// Index written by the previous generation of the system
pub const DEFAULT_LEGACY_INDEX: &str = "slarglebart_memories";

/// Which embedding backend to load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Local BERT-family model via Candle (downloads on first use)
    #[default]
    Candle,
    /// Deterministic feature hashing, no model files required
    Hash,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Hugging Face repository id of the model
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Configured vector dimension; every stored embedding must match it
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Normalize vectors to unit length
    #[serde(default = "default_true")]
    pub normalize: bool,

    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Hugging Face hub cache directory (defaults to the platform cache dir)
    #[serde(default)]
    pub cache_dir: Option<String>,

    /// Branch, tag or commit to pin the model to (defaults to `main`)
    #[serde(default)]
    pub revision: Option<String>,
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimension() -> usize {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_true() -> bool {
    true
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            normalize: true,
            provider: EmbeddingProvider::default(),
            cache_dir: None,
            revision: None,
        }
    }
}

/// Hybrid search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Weight of cosine similarity in the blended score
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// Weight of the keyword match score. Not required to sum to 1 with
    /// `vector_weight`.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,

    /// Number of results when the caller does not specify one
    #[serde(default = "default_search_size")]
    pub default_size: usize,

    /// Hits scoring below this are dropped by the consumer
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// How many top hits get their access stats bumped per read
    #[serde(default = "default_access_update_limit")]
    pub access_update_limit: usize,
}

fn default_vector_weight() -> f32 {
    0.7
}

fn default_keyword_weight() -> f32 {
    0.3
}

fn default_search_size() -> usize {
    10
}

fn default_min_score() -> f32 {
    0.3
}

fn default_access_update_limit() -> usize {
    5
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            default_size: default_search_size(),
            min_score: default_min_score(),
            access_update_limit: default_access_update_limit(),
        }
    }
}

/// Index names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default = "default_memory_index")]
    pub memory_index: String,

    /// Read-only fallback for session lookups
    #[serde(default = "default_legacy_index")]
    pub legacy_index: String,
}

fn default_memory_index() -> String {
    DEFAULT_MEMORY_INDEX.to_string()
}

fn default_legacy_index() -> String {
    DEFAULT_LEGACY_INDEX.to_string()
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            memory_index: default_memory_index(),
            legacy_index: default_legacy_index(),
        }
    }
}

/// OpenSearch connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSearchSettings {
    #[serde(default = "default_opensearch_url")]
    pub url: String,

    #[serde(default)]
    pub username: Option<String>,

    /// Loaded from env var, not stored in config file
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_opensearch_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for OpenSearchSettings {
    fn default() -> Self {
        Self {
            url: default_opensearch_url(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub index: IndexSettings,

    #[serde(default)]
    pub opensearch: OpenSearchSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            embedding: EmbeddingSettings::default(),
            search: SearchSettings::default(),
            index: IndexSettings::default(),
            opensearch: OpenSearchSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/slarglebart/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (SLARGLEBART_SEARCH__VECTOR_WEIGHT, ...)
    /// 5. Legacy environment overrides (EMBEDDING_MODEL, MEMORY_INDEX, ...)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, MemoryError> {
        let config_dir = ProjectDirs::from("", "", "slarglebart")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("embedding.model", default_embedding_model())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("embedding.dimension", default_embedding_dimension() as i64)
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("index.memory_index", default_memory_index())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("index.legacy_index", default_legacy_index())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("SLARGLEBART")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| MemoryError::Config(e.to_string()))?;

        let mut settings: Settings = config
            .try_deserialize()
            .map_err(|e| MemoryError::Config(e.to_string()))?;

        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Apply the legacy single-variable overrides.
    ///
    /// Values that fail to parse are ignored with a warning and the current
    /// value is kept.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            if model.trim().is_empty() {
                warn!(var = "EMBEDDING_MODEL", "Ignoring empty override");
            } else {
                self.embedding.model = model.trim().to_string();
            }
        }

        if let Some(raw) = lookup("EMBEDDING_DIMENSION") {
            match raw.trim().parse::<usize>() {
                Ok(dimension) if dimension > 0 => self.embedding.dimension = dimension,
                _ => warn!(var = "EMBEDDING_DIMENSION", value = %raw, "Invalid integer value, keeping default"),
            }
        }

        if let Some(index) = lookup("MEMORY_INDEX") {
            if index.trim().is_empty() {
                warn!(var = "MEMORY_INDEX", "Ignoring empty override");
            } else {
                self.index.memory_index = index.trim().to_string();
            }
        }

        if let Some(raw) = lookup("VECTOR_SEARCH_WEIGHT") {
            match parse_weight(&raw) {
                Some(weight) => self.search.vector_weight = weight,
                None => warn!(var = "VECTOR_SEARCH_WEIGHT", value = %raw, "Invalid float value, keeping default"),
            }
        }

        if let Some(raw) = lookup("KEYWORD_SEARCH_WEIGHT") {
            match parse_weight(&raw) {
                Some(weight) => self.search.keyword_weight = weight,
                None => warn!(var = "KEYWORD_SEARCH_WEIGHT", value = %raw, "Invalid float value, keeping default"),
            }
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.embedding.dimension == 0 {
            return Err(MemoryError::Config(
                "embedding.dimension must be > 0".to_string(),
            ));
        }
        for (name, weight) in [
            ("search.vector_weight", self.search.vector_weight),
            ("search.keyword_weight", self.search.keyword_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(MemoryError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.search.min_score) {
            return Err(MemoryError::Config(format!(
                "search.min_score must be 0.0-1.0, got {}",
                self.search.min_score
            )));
        }
        if self.search.default_size == 0 {
            return Err(MemoryError::Config(
                "search.default_size must be > 0".to_string(),
            ));
        }
        if self.index.memory_index.trim().is_empty() {
            return Err(MemoryError::Config(
                "index.memory_index must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_weight(raw: &str) -> Option<f32> {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|w| w.is_finite() && *w >= 0.0)
}
