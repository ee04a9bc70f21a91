//! Content, chunk, and data-source models
//!
//! Content arrives from external ingest; the indexing pipeline turns it into
//! chunks and embeddings. Cross-component references carry identifiers only,
//! never mutable handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A piece of content owned by a data source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    /// Stable content identifier
    pub id: String,

    /// Owning data source
    pub source_id: String,

    /// Title shown in results
    pub title: String,

    /// Raw text
    pub text: String,

    /// Arbitrary metadata attached by the source or the indexer
    pub metadata: HashMap<String, serde_json::Value>,

    /// Chunks produced by the last indexing pass
    pub chunks: Vec<ContentChunk>,

    /// Full-text embedding, when generated
    pub embedding: Option<Vec<f32>>,

    /// Monotonically increasing version per id
    pub version: u64,

    /// Last update timestamp
    pub last_updated: DateTime<Utc>,
}

impl Content {
    /// Create content with no chunks or embedding yet
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            title: title.into(),
            text: text.into(),
            metadata: HashMap::new(),
            chunks: Vec::new(),
            embedding: None,
            version: 1,
            last_updated: Utc::now(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Character span a chunk covers in its parent text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpan {
    /// Start offset, inclusive
    pub start_index: usize,

    /// End offset, exclusive
    pub end_index: usize,

    /// Configured window size that produced this chunk
    pub chunk_size: usize,

    /// Configured overlap between consecutive windows
    pub overlap: usize,
}

impl ChunkSpan {
    /// Length of the span
    pub fn len(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A bounded window of content used as the unit of vectorization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Chunk text
    pub text: String,

    /// Chunk embedding, when generated
    pub embedding: Option<Vec<f32>>,

    /// Ordinal position within the parent content, contiguous from 0
    pub position: u32,

    /// Span this chunk covers
    pub span: ChunkSpan,
}

/// Kind of change reported against indexed content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A change record consumed by `update_index`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChange {
    /// Affected content
    pub content_id: String,

    /// What happened
    pub kind: ChangeKind,

    /// When the change was observed
    pub timestamp: DateTime<Utc>,
}

impl ContentChange {
    pub fn new(content_id: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            content_id: content_id.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// A registered data source, as listed by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    /// Stable source identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Source kind (e.g. "file", "api", "database")
    pub kind: String,
}

impl DataSource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// Outcome of probing a data source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    /// Whether the source answered its probe
    pub is_healthy: bool,

    /// Probe round-trip time, when measured
    pub response_time_ms: Option<u64>,

    /// Most recent error, when any
    pub last_error: Option<String>,

    /// Errors observed since the source registered
    pub error_count: u64,
}

impl SourceHealth {
    /// A healthy probe outcome
    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            is_healthy: true,
            response_time_ms: Some(response_time_ms),
            last_error: None,
            error_count: 0,
        }
    }

    /// A failed probe outcome
    pub fn unhealthy(error: impl Into<String>, error_count: u64) -> Self {
        Self {
            is_healthy: false,
            response_time_ms: None,
            last_error: Some(error.into()),
            error_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_builder() {
        let content = Content::new("doc-1", "src-1", "Title", "Body text")
            .with_metadata("category", "docs");
        assert_eq!(content.version, 1);
        assert!(content.chunks.is_empty());
        assert_eq!(
            content.metadata.get("category"),
            Some(&serde_json::json!("docs"))
        );
    }

    #[test]
    fn test_chunk_span_len() {
        let span = ChunkSpan {
            start_index: 800,
            end_index: 1800,
            chunk_size: 1000,
            overlap: 200,
        };
        assert_eq!(span.len(), 1000);
        assert!(!span.is_empty());
    }

    #[test]
    fn test_source_health_constructors() {
        let ok = SourceHealth::healthy(12);
        assert!(ok.is_healthy);
        assert_eq!(ok.response_time_ms, Some(12));

        let bad = SourceHealth::unhealthy("connection refused", 3);
        assert!(!bad.is_healthy);
        assert_eq!(bad.error_count, 3);
    }
}
