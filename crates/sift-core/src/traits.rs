//! Collaborator traits consumed by the core
//!
//! Each external capability (embedding generation, vector storage, cache
//! backend, data-source registry, response synthesis) is polymorphic over a
//! small trait; every backend is its own adapter. The core never switches on
//! provider names.

use crate::content::{DataSource, SourceHealth};
use crate::{Result, SourceRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Shared health status
// ============================================================================

/// Tri-state health used for components and providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health report from a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    pub details: HashMap<String, serde_json::Value>,
}

impl ProviderHealth {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            details: HashMap::new(),
        }
    }

    pub fn unhealthy(reason: impl Into<String>) -> Self {
        let mut details = HashMap::new();
        details.insert("error".to_string(), serde_json::json!(reason.into()));
        Self {
            status: HealthStatus::Unhealthy,
            details,
        }
    }

    pub fn with_detail(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Embedding provider
// ============================================================================

/// A generated embedding with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    /// Fixed-dimension vector
    pub vector: Vec<f32>,

    /// Model that produced the vector
    pub model: String,

    /// Generation timestamp
    pub generated_at: DateTime<Utc>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>, model: impl Into<String>) -> Self {
        Self {
            vector,
            model: model.into(),
            generated_at: Utc::now(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// Text to fixed-dimension vector provider
///
/// Implementations truncate oversized input by their `max_tokens` budget
/// using a 4-characters-per-token approximation, and fail with
/// `SiftError::Timeout`, `SiftError::RateLimit`, or `SiftError::Provider`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed multiple texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Probe the provider
    async fn health(&self) -> Result<ProviderHealth>;

    /// Embedding dimension produced by this provider
    fn dimension(&self) -> usize;
}

// ============================================================================
// Vector store
// ============================================================================

/// A vector plus its metadata payload, as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A k-NN search match
///
/// Scores are similarities in [0, 1]: higher is more similar. Backends that
/// return distances map them through `score = 1 / (1 + distance)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Parameters for a k-NN search
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    /// Number of neighbours requested
    pub top_k: usize,

    /// Metadata equality filter; all entries must match
    pub filter: Option<HashMap<String, serde_json::Value>>,

    /// Whether to return payloads with matches
    pub include_metadata: bool,

    /// Minimum similarity to include
    pub threshold: Option<f32>,
}

impl SearchParams {
    pub fn top_k(k: usize) -> Self {
        Self {
            top_k: k,
            include_metadata: true,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: HashMap<String, serde_json::Value>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// Store-level statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreStats {
    pub total_vectors: u64,
    pub dimension: usize,
    pub index_type: String,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Vector upsert/search/delete backend
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace records
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// k-NN search
    async fn search(&self, vector: &[f32], params: &SearchParams) -> Result<Vec<ScoredPoint>>;

    /// Delete by id, returning how many were removed
    async fn delete(&self, ids: &[String]) -> Result<u64>;

    /// Store statistics
    async fn stats(&self) -> Result<VectorStoreStats>;

    /// Probe the store
    async fn health(&self) -> Result<ProviderHealth>;
}

// ============================================================================
// Cache backend
// ============================================================================

/// Backend info snapshot used by cache stats
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendInfo {
    /// Approximate memory used by stored entries
    pub used_memory_bytes: u64,

    /// Configured memory ceiling, when the backend has one
    pub max_memory_bytes: Option<u64>,

    /// Entries evicted by the backend's policy
    pub evictions: u64,
}

/// Key-value cache backend with per-key TTLs
///
/// The shape mirrors a networked KV store: plain get/set/del plus pattern
/// key listing and a pipelined batch write. No server-side scripting is
/// assumed.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value with a TTL in seconds
    async fn set_ex(&self, key: &str, ttl_secs: u64, value: String) -> Result<()>;

    /// Get many values, preserving order; missing keys yield `None`
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> Result<u64>;

    /// List keys matching a glob-style pattern (`*` wildcard only)
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Number of live keys
    async fn dbsize(&self) -> Result<u64>;

    /// Backend info for stats reporting
    async fn info(&self) -> Result<BackendInfo>;

    /// Round-trip liveness check
    async fn ping(&self) -> Result<()>;

    /// Pipelined batch write of `(key, ttl_secs, value)` entries
    async fn set_many(&self, entries: Vec<(String, u64, String)>) -> Result<()>;
}

// ============================================================================
// Data-source registry
// ============================================================================

/// Enumerates active data sources and probes their health
///
/// The registry itself is an external collaborator; the core consumes only
/// this listing-plus-probe capability.
#[async_trait]
pub trait DataSourceRegistry: Send + Sync {
    /// All currently active sources
    async fn list_active(&self) -> Result<Vec<DataSource>>;

    /// Probe one source
    async fn probe(&self, source_id: &str) -> Result<SourceHealth>;
}

// ============================================================================
// Synthesizer
// ============================================================================

/// Produces response text from ranked hits
///
/// Treated as a pure function from (query, ranked sources) to text; the
/// default implementation is a deterministic template, LLM-backed
/// implementations plug in behind the same trait.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, query_text: &str, sources: &[SourceRef]) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
        assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    }

    #[test]
    fn test_provider_health_builders() {
        let ok = ProviderHealth::healthy().with_detail("latency_ms", 4);
        assert_eq!(ok.status, HealthStatus::Healthy);
        assert_eq!(ok.details.get("latency_ms"), Some(&serde_json::json!(4)));

        let bad = ProviderHealth::unhealthy("no route");
        assert_eq!(bad.status, HealthStatus::Unhealthy);
        assert!(bad.details.contains_key("error"));
    }

    #[test]
    fn test_search_params_builder() {
        let mut filter = HashMap::new();
        filter.insert("source_id".to_string(), serde_json::json!("s1"));
        let params = SearchParams::top_k(5)
            .with_filter(filter)
            .with_threshold(0.2);
        assert_eq!(params.top_k, 5);
        assert!(params.include_metadata);
        assert_eq!(params.threshold, Some(0.2));
    }

    #[test]
    fn test_embedding_dimension() {
        let e = Embedding::new(vec![0.0; 8], "test-model");
        assert_eq!(e.dimension(), 8);
    }
}
