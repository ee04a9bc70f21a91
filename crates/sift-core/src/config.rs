//! Sift configuration management
//!
//! Handles configuration from environment variables and TOML files with
//! sensible defaults for development. Hot-updatable knobs (warming,
//! thresholds, timeouts) travel through `ConfigPatch`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Query pipeline configuration
    pub query: QueryConfig,

    /// Search engine configuration
    pub search: SearchConfig,

    /// Indexing pipeline configuration
    pub index: IndexConfig,

    /// Cache layer configuration
    pub cache: CacheConfig,

    /// Cache warmer configuration
    pub warmer: WarmerConfig,

    /// Health and monitoring thresholds
    pub health: HealthThresholds,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Vector store configuration
    pub vector: VectorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server
        if let Ok(host) = std::env::var("SIFT_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("SIFT_PORT") {
            config.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SIFT_PORT".to_string(),
                value: port,
            })?;
        }

        // Query pipeline
        if let Ok(cap) = std::env::var("SIFT_MAX_CONCURRENT_QUERIES") {
            config.query.max_concurrent_queries =
                cap.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "SIFT_MAX_CONCURRENT_QUERIES".to_string(),
                    value: cap,
                })?;
        }
        if let Ok(timeout) = std::env::var("SIFT_QUERY_TIMEOUT_MS") {
            config.query.default_timeout_ms =
                timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "SIFT_QUERY_TIMEOUT_MS".to_string(),
                    value: timeout,
                })?;
        }

        // Embedding provider
        if let Ok(provider) = std::env::var("SIFT_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.embedding.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.embedding.ollama_url = url;
        }
        if let Ok(model) = std::env::var("SIFT_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }

        // Vector store
        if let Ok(backend) = std::env::var("SIFT_VECTOR_BACKEND") {
            config.vector.backend = backend.parse()?;
        }
        if let Ok(url) = std::env::var("QDRANT_URL") {
            config.vector.qdrant_url = url;
        }

        // CORS origins (comma-separated)
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        if env_config.server.host != ServerConfig::default().host {
            self.server.host = env_config.server.host;
        }
        if env_config.server.port != ServerConfig::default().port {
            self.server.port = env_config.server.port;
        }

        // Always use env for sensitive values
        if env_config.embedding.api_key.is_some() {
            self.embedding.api_key = env_config.embedding.api_key;
        }

        Ok(self)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 300,
            cors_enabled: true,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Query pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Hard cap on in-flight queries; excess is rejected
    pub max_concurrent_queries: usize,

    /// Overall pipeline timeout in milliseconds
    pub default_timeout_ms: u64,

    /// Fan out to data sources concurrently when true
    pub enable_parallel_search: bool,

    /// Bypass the cache entirely when false
    pub cache_enabled: bool,

    /// Hits below this score are dropped
    pub min_confidence_threshold: f32,

    /// Per-source search depth (top-k)
    pub max_results_per_source: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: 50,
            default_timeout_ms: 30_000,
            enable_parallel_search: true,
            cache_enabled: true,
            min_confidence_threshold: 0.1,
            max_results_per_source: 10,
        }
    }
}

/// Search engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Weight of the vector score in hybrid fusion
    pub vector_weight: f32,

    /// Weight of the keyword score in hybrid fusion
    pub keyword_weight: f32,

    /// Apply diversity re-ranking by default
    pub rerank_results: bool,

    /// Widening multiplier for the candidate pool retrieved before
    /// keyword scoring and re-ranking
    pub candidate_multiplier: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            keyword_weight: 0.3,
            rerank_results: false,
            candidate_multiplier: 3,
        }
    }
}

/// Indexing pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive sliding windows
    pub chunk_overlap: usize,

    /// Chunks shorter than this are not emitted
    pub min_chunk_size: usize,

    /// Contents per batch group
    pub batch_size: usize,

    /// Parallel embedding tasks within a group
    pub concurrency: usize,

    /// Run content metadata extraction during indexing
    pub extract_metadata: bool,

    /// Default chunking strategy name
    pub default_strategy: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_size: 100,
            batch_size: 10,
            concurrency: 4,
            extract_metadata: true,
            default_strategy: "sliding_window".to_string(),
        }
    }
}

/// Cache layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for cached query results, seconds
    pub query_ttl_secs: u64,

    /// TTL for cached embeddings and processed content, seconds
    pub embedding_ttl_secs: u64,

    /// Memory ceiling pushed to the backend on startup
    pub max_memory_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // Query results may change as sources are re-indexed
            query_ttl_secs: 3600,
            // Embeddings are stable for a given text
            embedding_ttl_secs: 86_400,
            max_memory_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Cache warmer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmerConfig {
    /// Run the warming loop
    pub enabled: bool,

    /// Seconds between warming ticks
    pub interval_secs: u64,

    /// Stats idle longer than this are pruned, seconds
    pub max_age_secs: u64,

    /// Minimum access count before a fingerprint counts as popular
    pub popularity_threshold: u64,

    /// Fingerprints preloaded per batch
    pub preload_batch_size: usize,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            max_age_secs: 86_400,
            popularity_threshold: 3,
            preload_batch_size: 5,
        }
    }
}

/// Alerting and probe thresholds for health monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Seconds between health-check ticks
    pub check_interval_secs: u64,

    /// Seconds between system snapshots
    pub snapshot_interval_secs: u64,

    /// Hours of metric history retained
    pub retention_hours: u64,

    /// Average response time above this is slow, milliseconds
    pub response_time_ms: u64,

    /// Error rate above this alerts, fraction in [0, 1]
    pub error_rate: f64,

    /// Cache hit rate below this degrades the cache component
    pub cache_hit_rate: f64,

    /// Heap/RSS fraction above this degrades the api component
    pub memory_usage: f64,

    /// Consecutive data-source failures before alerting
    pub consecutive_failures: u64,

    /// Fraction of unhealthy sources that flips data_sources to unhealthy
    pub data_source_failure_percentage: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            snapshot_interval_secs: 30,
            retention_hours: 24,
            response_time_ms: 5_000,
            error_rate: 0.1,
            cache_hit_rate: 0.3,
            memory_usage: 0.9,
            consecutive_failures: 3,
            data_source_failure_percentage: 0.5,
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider to use
    pub provider: EmbeddingProviderKind,

    /// API key for hosted providers
    pub api_key: Option<String>,

    /// Override base URL for hosted providers
    pub base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Embedding model name
    pub model: String,

    /// Token budget; longer input is truncated at 4 chars per token
    pub max_tokens: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::OpenAi,
            api_key: None,
            base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "text-embedding-3-small".to_string(),
            max_tokens: 8191,
            timeout_secs: 30,
        }
    }
}

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    OpenAi,
    Ollama,
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "SIFT_EMBEDDING_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Backend to use
    pub backend: VectorBackendKind,

    /// Qdrant gRPC URL
    pub qdrant_url: String,

    /// Collection name
    pub collection: String,

    /// Vector dimension (must match the embedding model)
    pub dimension: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackendKind::Memory,
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "sift_chunks".to_string(),
            dimension: 1536,
        }
    }
}

/// Supported vector store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackendKind {
    Memory,
    Qdrant,
}

impl std::str::FromStr for VectorBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(ConfigError::InvalidValue {
                key: "SIFT_VECTOR_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Patch of hot-updatable knobs, applied without a restart
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigPatch {
    /// New pipeline timeout
    pub default_timeout_ms: Option<u64>,

    /// New confidence floor
    pub min_confidence_threshold: Option<f32>,

    /// Toggle the result cache
    pub cache_enabled: Option<bool>,

    /// Toggle the warming loop
    pub warming_enabled: Option<bool>,

    /// New warming interval
    pub warming_interval_secs: Option<u64>,

    /// Replacement alert thresholds
    pub thresholds: Option<HealthThresholds>,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
