/// Configuration system for repo-rag
///
/// Supports loading from multiple sources with priority:
/// Environment variables > Config file > Defaults
use crate::error::{ConfigError, RagError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Vector database configuration
    #[serde(default)]
    pub vector_db: VectorDbConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Indexing configuration
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Search and refinement configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Git tooling configuration
    #[serde(default)]
    pub git: GitConfig,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Vector database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    /// Database backend: "qdrant" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Qdrant server URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Collection name for vector storage
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Maximum number of points sent in one upsert request
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,

    /// Attempts per upsert/delete request before the failure is surfaced
    #[serde(default = "default_store_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff between store attempts
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "http" (external service) or "hashing" (offline)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Embedding endpoint URL
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    /// Model name sent with every request
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Expected vector dimension; must match the vector store collection
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Optional bearer token for the embedding service
    #[serde(default)]
    pub api_key: Option<String>,

    /// Input is truncated to this many characters after preprocessing
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Timeout in seconds for a single embedding request
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Attempts per embedding request before the failure is surfaced
    #[serde(default = "default_embedding_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff between attempts
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Sliding-window request limit (0 disables throttling)
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Chunk window size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive windows in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Number of most recent commits indexed per run
    #[serde(default = "default_commit_history_depth")]
    pub commit_history_depth: usize,

    /// Concurrent embedding requests per file or commit
    #[serde(default = "default_embedding_concurrency")]
    pub embedding_concurrency: usize,

    /// Maximum file size to index (in bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Tracked paths matching these globs are not indexed
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Skip re-embedding files whose content hash is unchanged since the last run
    #[serde(default)]
    pub skip_unchanged_files: bool,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default result limit
    #[serde(default = "default_result_limit")]
    pub limit: usize,

    /// Top-hit score at which refinement stops (0.0 to 1.0)
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,

    /// Maximum number of query rewrites per search
    #[serde(default = "default_max_refinements")]
    pub max_refinements: usize,

    /// Return the best-scoring iteration instead of the last one
    #[serde(default)]
    pub keep_best_iteration: bool,
}

/// Git tooling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Timeout for the `git diff` shell-out
    #[serde(default = "default_diff_timeout")]
    pub diff_timeout_secs: u64,

    /// Diff summaries longer than this are truncated
    #[serde(default = "default_max_diff_summary_chars")]
    pub max_diff_summary_chars: usize,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Hash cache file path
    #[serde(default = "default_hash_cache_path")]
    pub hash_cache_path: PathBuf,
}

// Default value functions
fn default_db_backend() -> String {
    #[cfg(feature = "qdrant-backend")]
    return "qdrant".to_string();
    #[cfg(not(feature = "qdrant-backend"))]
    return "memory".to_string();
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_collection_name() -> String {
    "repo_index".to_string()
}

fn default_upsert_batch_size() -> usize {
    64
}

fn default_store_timeout() -> u64 {
    30
}

fn default_store_max_attempts() -> u32 {
    3
}

fn default_embedding_provider() -> String {
    "http".to_string()
}

fn default_embedding_endpoint() -> String {
    "http://localhost:11434/api/embed".to_string()
}

fn default_model_name() -> String {
    "nomic-embed-text".to_string()
}

fn default_dimension() -> usize {
    768
}

fn default_max_input_chars() -> usize {
    8000
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_embedding_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_requests_per_minute() -> u32 {
    600
}

fn default_chunk_size() -> usize {
    2000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_commit_history_depth() -> usize {
    50
}

fn default_embedding_concurrency() -> usize {
    4
}

fn default_max_file_size() -> usize {
    1_048_576 // 1 MB
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/package-lock.json".to_string(),
        "**/yarn.lock".to_string(),
        "**/Cargo.lock".to_string(),
        "**/*.min.js".to_string(),
        "**/*.min.css".to_string(),
    ]
}

fn default_result_limit() -> usize {
    10
}

fn default_relevance_threshold() -> f32 {
    0.75
}

fn default_max_refinements() -> usize {
    2
}

fn default_diff_timeout() -> u64 {
    30
}

fn default_max_diff_summary_chars() -> usize {
    10_000
}

fn default_hash_cache_path() -> PathBuf {
    crate::paths::PlatformPaths::default_hash_cache_path()
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            backend: default_db_backend(),
            qdrant_url: default_qdrant_url(),
            collection_name: default_collection_name(),
            upsert_batch_size: default_upsert_batch_size(),
            timeout_secs: default_store_timeout(),
            max_attempts: default_store_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            endpoint: default_embedding_endpoint(),
            model_name: default_model_name(),
            dimension: default_dimension(),
            api_key: None,
            max_input_chars: default_max_input_chars(),
            timeout_secs: default_embedding_timeout(),
            max_attempts: default_embedding_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            commit_history_depth: default_commit_history_depth(),
            embedding_concurrency: default_embedding_concurrency(),
            max_file_size: default_max_file_size(),
            exclude_patterns: default_exclude_patterns(),
            skip_unchanged_files: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_result_limit(),
            relevance_threshold: default_relevance_threshold(),
            max_refinements: default_max_refinements(),
            keep_best_iteration: false,
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            diff_timeout_secs: default_diff_timeout(),
            max_diff_summary_chars: default_max_diff_summary_chars(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hash_cache_path: default_hash_cache_path(),
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> RagError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, RagError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, RagError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), RagError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), RagError> {
        if self.vector_db.backend != "qdrant" && self.vector_db.backend != "memory" {
            return Err(invalid(
                "vector_db.backend",
                format!(
                    "must be 'qdrant' or 'memory', got '{}'",
                    self.vector_db.backend
                ),
            ));
        }

        if self.vector_db.collection_name.trim().is_empty() {
            return Err(invalid("vector_db.collection_name", "must not be empty"));
        }

        if self.vector_db.upsert_batch_size == 0 {
            return Err(invalid(
                "vector_db.upsert_batch_size",
                "must be greater than 0",
            ));
        }

        if self.vector_db.max_attempts == 0 {
            return Err(invalid("vector_db.max_attempts", "must be greater than 0"));
        }

        if self.embedding.provider != "http" && self.embedding.provider != "hashing" {
            return Err(invalid(
                "embedding.provider",
                format!(
                    "must be 'http' or 'hashing', got '{}'",
                    self.embedding.provider
                ),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(invalid("embedding.dimension", "must be greater than 0"));
        }

        if self.embedding.max_input_chars == 0 {
            return Err(invalid("embedding.max_input_chars", "must be greater than 0"));
        }

        if self.embedding.max_attempts == 0 {
            return Err(invalid("embedding.max_attempts", "must be greater than 0"));
        }

        if self.indexing.chunk_size == 0 {
            return Err(invalid("indexing.chunk_size", "must be greater than 0"));
        }

        if self.indexing.chunk_overlap >= self.indexing.chunk_size {
            return Err(invalid(
                "indexing.chunk_overlap",
                format!(
                    "must be less than indexing.chunk_size ({}), got {}",
                    self.indexing.chunk_size, self.indexing.chunk_overlap
                ),
            ));
        }

        if self.indexing.embedding_concurrency == 0 {
            return Err(invalid(
                "indexing.embedding_concurrency",
                "must be greater than 0",
            ));
        }

        if self.indexing.max_file_size == 0 {
            return Err(invalid("indexing.max_file_size", "must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.search.relevance_threshold) {
            return Err(invalid(
                "search.relevance_threshold",
                format!(
                    "must be between 0.0 and 1.0, got {}",
                    self.search.relevance_threshold
                ),
            ));
        }

        if self.search.limit == 0 {
            return Err(invalid("search.limit", "must be greater than 0"));
        }

        if self.git.max_diff_summary_chars == 0 {
            return Err(invalid("git.max_diff_summary_chars", "must be greater than 0"));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var("REPO_RAG_DB_BACKEND") {
            self.vector_db.backend = backend;
        }

        if let Ok(url) = std::env::var("REPO_RAG_QDRANT_URL") {
            self.vector_db.qdrant_url = url;
        }

        if let Ok(collection) = std::env::var("REPO_RAG_COLLECTION") {
            self.vector_db.collection_name = collection;
        }

        if let Ok(provider) = std::env::var("REPO_RAG_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Ok(endpoint) = std::env::var("REPO_RAG_EMBEDDING_URL") {
            self.embedding.endpoint = endpoint;
        }

        if let Ok(model) = std::env::var("REPO_RAG_MODEL") {
            self.embedding.model_name = model;
        }

        if let Ok(dimension) = std::env::var("REPO_RAG_DIMENSION")
            && let Ok(dim) = dimension.parse()
        {
            self.embedding.dimension = dim;
        }

        if let Ok(key) = std::env::var("REPO_RAG_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(key);
        }

        if let Ok(rpm) = std::env::var("REPO_RAG_REQUESTS_PER_MINUTE")
            && let Ok(limit) = rpm.parse()
        {
            self.embedding.requests_per_minute = limit;
        }

        if let Ok(depth) = std::env::var("REPO_RAG_HISTORY_DEPTH")
            && let Ok(d) = depth.parse()
        {
            self.indexing.commit_history_depth = d;
        }

        if let Ok(threshold) = std::env::var("REPO_RAG_RELEVANCE_THRESHOLD")
            && let Ok(t) = threshold.parse()
        {
            self.search.relevance_threshold = t;
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, RagError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
