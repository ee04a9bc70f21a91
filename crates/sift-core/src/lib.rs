//! Sift Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the Sift system:
//! - Query lifecycle models (queries, parsed queries, results, source refs)
//! - Search hit and ranking-factor structures
//! - Common error types and the surface error taxonomy
//! - Shared traits for collaborators (embedding, vector store, cache backend,
//!   data-source registry, synthesizer)
//! - Configuration management
//! - Query fingerprinting and content hashing

pub mod config;
pub mod content;
pub mod fingerprint;
pub mod traits;

pub use config::{AppConfig, CacheConfig, ConfigError, EmbeddingConfig, HealthThresholds,
    IndexConfig, LoggingConfig, QueryConfig, SearchConfig, ServerConfig, VectorConfig,
    WarmerConfig};
pub use content::{ChangeKind, ChunkSpan, Content, ContentChange, ContentChunk, DataSource,
    SourceHealth};
pub use fingerprint::{content_text_hash, query_fingerprint};
pub use traits::{BackendInfo, CacheBackend, DataSourceRegistry, Embedding, EmbeddingProvider,
    HealthStatus, ProviderHealth, ScoredPoint, SearchParams, Synthesizer, VectorRecord,
    VectorStore, VectorStoreStats};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Maximum accepted query length, in characters after trimming.
pub const MAX_QUERY_CHARS: usize = 10_000;

/// Core error types for Sift operations
#[derive(Error, Debug)]
pub enum SiftError {
    #[error("Validation failed for `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("Query capacity exceeded: {active} active, limit {limit}")]
    CapacityExceeded { active: usize, limit: usize },

    #[error("Operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Rate limited: {0}")]
    RateLimit(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Indexing error: {0}")]
    Index(String),

    #[error("Data source {source_id} failed: {message}")]
    DataSource { source_id: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SiftError {
    /// Build a field-level validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable surface code for this error, as exposed at the service boundary
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::RateLimit(_) => "RATE_LIMIT",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Search(_) => "SEARCH_ERROR",
            Self::Index(_) => "INDEX_ERROR",
            Self::DataSource { .. } => "SOURCE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Other(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SiftError>;

// ============================================================================
// Query Models
// ============================================================================

/// A user query entering the pipeline
///
/// Immutable once constructed; validation happens in the constructors so a
/// `Query` in hand is always well-formed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Unique identifier (v4 when generated here)
    pub id: Uuid,

    /// Query text, trimmed, 1..=10 000 characters
    pub text: String,

    /// Optional request context (e.g. domain, recency hints)
    pub context: Option<HashMap<String, String>>,

    /// Optional structured filters supplied by the caller
    pub filters: Option<Vec<QueryFilter>>,

    /// Creation timestamp
    pub timestamp: DateTime<Utc>,

    /// Requesting user, when known
    pub user_id: Option<String>,
}

impl Query {
    /// Create a new query from raw text, validating it
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SiftError::validation("text", "query text must not be empty"));
        }
        if trimmed.chars().count() > MAX_QUERY_CHARS {
            return Err(SiftError::validation(
                "text",
                format!("query text exceeds {MAX_QUERY_CHARS} characters"),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            text: trimmed.to_string(),
            context: None,
            filters: None,
            timestamp: Utc::now(),
            user_id: None,
        })
    }

    /// Use a caller-supplied identifier instead of a generated one
    pub fn with_id(mut self, id: &str) -> Result<Self> {
        self.id = Uuid::parse_str(id)
            .map_err(|_| SiftError::validation("id", format!("`{id}` is not a valid UUID")))?;
        Ok(self)
    }

    /// Attach request context
    pub fn with_context(mut self, context: HashMap<String, String>) -> Self {
        self.context = Some(context);
        self
    }

    /// Attach structured filters
    pub fn with_filters(mut self, filters: Vec<QueryFilter>) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Attach the requesting user
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Cache fingerprint over the semantically relevant parts of this query
    pub fn fingerprint(&self) -> String {
        query_fingerprint(&self.text, self.context.as_ref(), self.filters.as_deref())
    }
}

/// A structured filter attached to a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Field the filter applies to (e.g. "date", "type")
    pub field: String,

    /// Comparison operator
    pub operator: FilterOperator,

    /// Filter value
    pub value: serde_json::Value,
}

impl QueryFilter {
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Comparison operators supported in query filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contains => "contains",
        }
    }
}

impl std::str::FromStr for FilterOperator {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "contains" => Ok(Self::Contains),
            other => Err(SiftError::validation(
                "operator",
                format!("unknown filter operator `{other}`"),
            )),
        }
    }
}

/// Detected query intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    /// Looking for an answer to a question
    Question,
    /// Looking for matching documents
    Search,
    /// Anything else
    General,
}

/// Result of parsing a raw query
///
/// `processed_text` is lowercased, punctuation-stripped (keeping `-`, `_`,
/// `.`), and whitespace-normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Text as the caller supplied it (trimmed)
    pub original_text: String,

    /// Normalized text used for downstream matching
    pub processed_text: String,

    /// Detected intent
    pub intent: QueryIntent,

    /// Entities detected in the question, deduplicated
    pub entities: Vec<String>,

    /// Filters extracted from the text plus any supplied on the query
    pub filters: Vec<QueryFilter>,
}

/// Query optimization applied before search fan-out
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptimization {
    /// Stemmed/expanded search terms
    pub expanded_terms: Vec<String>,

    /// Synonyms looked up for detected entities
    pub synonyms: Vec<String>,

    /// Filters carried into the search
    pub filters: Vec<QueryFilter>,

    /// Field boost multipliers, all non-negative
    pub boosts: HashMap<String, f32>,
}

impl QueryOptimization {
    /// Insert a boost, clamping negatives to zero
    pub fn add_boost(&mut self, field: impl Into<String>, multiplier: f32) {
        self.boosts.insert(field.into(), multiplier.max(0.0));
    }
}

// ============================================================================
// Search Hits and Ranking
// ============================================================================

/// Per-signal scoring breakdown for a hit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankingFactors {
    /// Semantic (vector) similarity in [0, 1]
    pub semantic: f32,

    /// Keyword score in [0, 1], when the keyword path ran
    pub keyword: Option<f32>,

    /// Metadata boost applied (title/category/tag matches)
    pub metadata: f32,

    /// Recency boost applied
    pub recency: f32,
}

/// A single search result with scoring breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Vector-store point id
    pub id: String,

    /// Raw vector similarity in [0, 1]
    pub vector_score: f32,

    /// Keyword score in [0, 1], when computed
    pub keyword_score: Option<f32>,

    /// Final fused score in [0, 1]
    pub final_score: f32,

    /// Scoring breakdown
    pub ranking_factors: RankingFactors,

    /// Metadata payload carried from the store
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SearchHit {
    fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Identity used for deduplication: the content id when present,
    /// otherwise the point id
    pub fn dedup_key(&self) -> &str {
        self.meta_str("content_id").unwrap_or(&self.id)
    }

    /// Owning data source, when the payload carries one
    pub fn source_id(&self) -> Option<&str> {
        self.meta_str("source_id")
    }

    /// Content category, when the payload carries one
    pub fn category(&self) -> Option<&str> {
        self.meta_str("category")
    }

    /// Content title, when the payload carries one
    pub fn title(&self) -> Option<&str> {
        self.meta_str("title")
    }

    /// Text excerpt, when the payload carries one
    pub fn excerpt(&self) -> Option<&str> {
        self.meta_str("text").or_else(|| self.meta_str("excerpt"))
    }
}

// ============================================================================
// Query Results
// ============================================================================

/// Reference to a source that contributed to a result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    /// Data source identifier
    pub source_id: String,

    /// Human-readable source name
    pub source_name: String,

    /// Content identifier within the source
    pub content_id: String,

    /// Content title
    pub title: String,

    /// Short excerpt shown to the user
    pub excerpt: String,

    /// The hit's final score, in [0, 1]
    pub relevance_score: f32,

    /// Link to the content, when available
    pub url: Option<String>,
}

impl SourceRef {
    /// Build a source reference from a ranked hit
    pub fn from_hit(hit: &SearchHit) -> Self {
        Self {
            source_id: hit.source_id().unwrap_or("unknown").to_string(),
            source_name: hit
                .meta_str("source_name")
                .unwrap_or("Unknown source")
                .to_string(),
            content_id: hit.dedup_key().to_string(),
            title: hit.title().unwrap_or("Untitled").to_string(),
            excerpt: truncate_excerpt(hit.excerpt().unwrap_or_default(), 300),
            relevance_score: hit.final_score,
            url: hit.meta_str("url").map(str::to_string),
        }
    }
}

/// Final answer produced by the query pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Query identifier this result answers
    pub id: Uuid,

    /// Synthesized response text
    pub response: String,

    /// Contributing sources, at most ten
    pub sources: Vec<SourceRef>,

    /// Overall confidence in [0, 1]
    pub confidence: f32,

    /// Wall-clock pipeline time
    pub processing_time_ms: u64,

    /// Whether this result was served from the cache
    pub cached: bool,
}

impl QueryResult {
    /// Well-formed failure result carrying an apology, used whenever the
    /// pipeline cannot produce a real answer
    pub fn failure(id: Uuid, response: impl Into<String>, processing_time_ms: u64) -> Self {
        Self {
            id,
            response: response.into(),
            sources: Vec::new(),
            confidence: 0.0,
            processing_time_ms,
            cached: false,
        }
    }
}

/// Truncate an excerpt on a char boundary, appending an ellipsis
pub fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

// ============================================================================
// Tests
// ============================================================================
