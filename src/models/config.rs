use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11411";
pub const DEFAULT_EMBEDDING_MODEL: &str = "paraphrase-multilingual-MiniLM-L12-v2";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "documents";

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "DOCINDEX_";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub pacing: PacingConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("docindex").join("config.toml"))
    }

    /// Load the user config file (if any), then apply `DOCINDEX_*` overrides
    /// from the process environment and validate the result.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Apply overrides looked up by full variable name (`DOCINDEX_CHUNK_SIZE`, ...).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("CHUNK_SIZE") {
            self.indexing.chunk_size = parse_env("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("CHUNK_OVERLAP") {
            self.indexing.chunk_overlap = parse_env("CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("MAX_FILE_SIZE") {
            self.indexing.max_file_size = parse_env("MAX_FILE_SIZE", &v)?;
        }
        if let Some(v) = get("MAX_CHUNKS") {
            self.indexing.max_chunks_per_file = parse_env("MAX_CHUNKS", &v)?;
        }
        if let Some(v) = get("BATCH_SIZE") {
            self.embedding.batch_size = parse_env("BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("EMBEDDING_URL") {
            self.embedding.url = v;
        }
        if let Some(v) = get("COLLECTION") {
            self.vector_store.collection = v;
        }
        if let Some(v) = get("VECTOR_STORE_URL") {
            self.vector_store.url = v;
        }
        if let Some(v) = get("VECTOR_STORE_API_KEY") {
            self.vector_store.api_key = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let idx = &self.indexing;
        if idx.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "indexing.chunk_size must be greater than 0".to_string(),
            ));
        }
        if idx.chunk_overlap >= idx.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "indexing.chunk_overlap ({}) must be smaller than chunk_size ({})",
                idx.chunk_overlap, idx.chunk_size
            )));
        }
        if idx.max_chunks_per_file == 0 || idx.file_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "indexing.max_chunks_per_file and file_batch_size must be greater than 0"
                    .to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be greater than 0".to_string(),
            ));
        }
        if self.vector_store.collection.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "vector_store.collection must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: format!("{ENV_PREFIX}{name}"),
        value: value.to_string(),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Remote embedding server speaking the `/embed` JSON protocol
    #[default]
    Http,
    /// In-process ONNX model
    Onnx,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pooling {
    /// Attention-masked mean of token embeddings (sentence-transformers models)
    #[default]
    Mean,
    /// Hidden state of the last non-padding token (decoder embedding models)
    LastToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_model_name")]
    pub model: String,

    /// Directory holding `model.onnx` and `tokenizer.json` for the ONNX backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub pooling: Pooling,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_model_name() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_max_tokens() -> u32 {
    256
}

fn default_batch_size() -> u32 {
    2
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            url: default_embedding_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            model: default_model_name(),
            model_dir: None,
            dimension: default_dimension(),
            max_tokens: default_max_tokens(),
            pooling: Pooling::default(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDriver {
    #[default]
    Qdrant,
    #[serde(alias = "postgres", alias = "pgvector")]
    PostgreSQL,
    /// Process-local store, useful for dry runs
    Memory,
}

impl std::fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorDriver::Qdrant => write!(f, "qdrant"),
            VectorDriver::PostgreSQL => write!(f, "postgresql"),
            VectorDriver::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub driver: VectorDriver,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// PostgreSQL schema; `public` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,

    #[serde(default = "default_pool_acquire_timeout")]
    pub pool_acquire_timeout: u32,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_pool_max() -> u32 {
    5
}

fn default_pool_acquire_timeout() -> u32 {
    30
}

impl VectorStoreConfig {
    /// `schema.collection` for PostgreSQL, or just the collection name.
    pub fn qualified_table_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.collection),
            None => self.collection.clone(),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: VectorDriver::default(),
            url: default_qdrant_url(),
            collection: default_collection(),
            api_key: None,
            schema: None,
            pool_max: default_pool_max(),
            pool_acquire_timeout: default_pool_acquire_timeout(),
        }
    }
}

/// Chunking, size limits and batching for indexing jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Requested chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Upper bound applied to the requested chunk size per file.
    #[serde(default = "default_effective_chunk_size")]
    pub effective_chunk_size: usize,

    /// Upper bound applied to the requested overlap per file.
    #[serde(default = "default_effective_overlap")]
    pub effective_overlap: usize,

    /// Hard ceiling enforced by the chunker itself.
    #[serde(default = "default_chunk_size_ceiling")]
    pub chunk_size_ceiling: usize,

    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    /// Files above this many bytes are skipped without being read.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Decoded content above this many characters is truncated before parsing.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    #[serde(default = "default_max_chunks_per_file")]
    pub max_chunks_per_file: usize,

    #[serde(default = "default_file_batch_size")]
    pub file_batch_size: usize,

    #[serde(default = "default_large_input_threshold")]
    pub large_input_threshold: usize,

    #[serde(default = "default_reduced_batch_size")]
    pub reduced_batch_size: usize,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

fn default_chunk_size() -> usize {
    256
}

fn default_chunk_overlap() -> usize {
    64
}

fn default_effective_chunk_size() -> usize {
    128
}

fn default_effective_overlap() -> usize {
    32
}

fn default_chunk_size_ceiling() -> usize {
    1000
}

fn default_max_text_length() -> usize {
    500_000
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024
}

fn default_max_content_length() -> usize {
    100_000
}

fn default_max_chunks_per_file() -> usize {
    50
}

fn default_file_batch_size() -> usize {
    5
}

fn default_large_input_threshold() -> usize {
    100
}

fn default_reduced_batch_size() -> usize {
    2
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/.git/**".to_string(),
        "**/.venv/**".to_string(),
    ]
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            effective_chunk_size: default_effective_chunk_size(),
            effective_overlap: default_effective_overlap(),
            chunk_size_ceiling: default_chunk_size_ceiling(),
            max_text_length: default_max_text_length(),
            max_file_size: default_max_file_size(),
            max_content_length: default_max_content_length(),
            max_chunks_per_file: default_max_chunks_per_file(),
            file_batch_size: default_file_batch_size(),
            large_input_threshold: default_large_input_threshold(),
            reduced_batch_size: default_reduced_batch_size(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

/// Pauses inserted between units of work, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_embedding_pause")]
    pub embedding_pause_ms: u64,

    #[serde(default = "default_file_pause")]
    pub file_pause_ms: u64,

    #[serde(default = "default_batch_pause")]
    pub batch_pause_ms: u64,
}

fn default_embedding_pause() -> u64 {
    200
}

fn default_file_pause() -> u64 {
    200
}

fn default_batch_pause() -> u64 {
    1000
}

impl PacingConfig {
    /// No pauses at all.
    pub fn none() -> Self {
        Self {
            embedding_pause_ms: 0,
            file_pause_ms: 0,
            batch_pause_ms: 0,
        }
    }

    pub fn embedding_pause(&self) -> Duration {
        Duration::from_millis(self.embedding_pause_ms)
    }

    pub fn file_pause(&self) -> Duration {
        Duration::from_millis(self.file_pause_ms)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            embedding_pause_ms: default_embedding_pause(),
            file_pause_ms: default_file_pause(),
            batch_pause_ms: default_batch_pause(),
        }
    }
}
