//! Sift Index - Content indexing pipeline
//!
//! Turns content into chunks and embeddings and persists them to the vector
//! store, idempotently:
//! - Chunking via sliding-window or sentence-based strategies
//! - Full-text plus batched chunk embeddings with partial-failure reporting
//! - Text-hash short-circuit so unchanged content is never re-embedded
//! - Change-driven cache and vector invalidation

use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use sift_cache::CacheStore;
use sift_core::config::IndexConfig;
use sift_core::{
    content_text_hash, ChangeKind, Content, ContentChange, ContentChunk, Embedding,
    EmbeddingProvider, Result, SiftError, VectorRecord, VectorStore,
};
use std::sync::Arc;
use std::time::Instant;

pub mod chunker;
pub mod metadata;

pub use chunker::{chunk_text, sentence_based, sliding_window, ChunkConfig, ChunkStrategy};
pub use metadata::{ExtractedEntities, ExtractedMetadata, MetadataExtractor};

// ============================================================================
// Results
// ============================================================================

/// Outcome class of an indexing operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Success,
    Partial,
    Failed,
}

/// Per-content indexing outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingResult {
    pub content_id: String,
    pub status: IndexStatus,
    pub chunks_created: usize,
    pub embeddings_generated: usize,
    pub processing_time_ms: u64,
    pub errors: Vec<String>,
}

impl IndexingResult {
    fn failed(content_id: impl Into<String>, error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            content_id: content_id.into(),
            status: IndexStatus::Failed,
            chunks_created: 0,
            embeddings_generated: 0,
            processing_time_ms: elapsed_ms,
            errors: vec![error.into()],
        }
    }
}

/// Aggregate outcome of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<IndexingResult>,
    pub processing_time_ms: u64,
}

impl BatchResult {
    fn from_results(results: Vec<IndexingResult>, elapsed_ms: u64) -> Self {
        let succeeded = results
            .iter()
            .filter(|r| r.status != IndexStatus::Failed)
            .count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
            processing_time_ms: elapsed_ms,
        }
    }
}

// ============================================================================
// Indexer
// ============================================================================

/// Indexing pipeline over an embedding provider, vector store, and cache
pub struct Indexer {
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    cache: Arc<CacheStore>,
    extractor: MetadataExtractor,
    config: IndexConfig,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        cache: Arc<CacheStore>,
        config: IndexConfig,
    ) -> Self {
        Self {
            embedder,
            vectors,
            cache,
            extractor: MetadataExtractor::new(),
            config,
        }
    }

    /// Names of the chunking strategies this indexer supports
    pub fn available_strategies(&self) -> Vec<&'static str> {
        ChunkStrategy::available()
    }

    /// Index one piece of content
    ///
    /// Short-circuits when the stored text hash matches, re-chunks and
    /// re-embeds otherwise. Chunk embedding failures skip the chunk and
    /// downgrade the status to partial; when every chunk fails the status
    /// is failed.
    pub fn index_content<'a>(
        &'a self,
        content: &'a Content,
        strategy: Option<ChunkStrategy>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<IndexingResult>> + Send + 'a>>
    {
        Box::pin(self.index_content_inner(content, strategy))
    }

    async fn index_content_inner(
        &self,
        content: &Content,
        strategy: Option<ChunkStrategy>,
    ) -> Result<IndexingResult> {
        let start = Instant::now();

        if content.text.trim().is_empty() {
            return Err(SiftError::Index(format!(
                "content {} has no text",
                content.id
            )));
        }

        let text_hash = content_text_hash(&content.text);
        if let Some(stored) = self.cache.get_content_hash(&content.id).await {
            if stored == text_hash {
                let existing = self
                    .cache
                    .get_processed_content(&content.id)
                    .await
                    .map(|c| c.chunks.len())
                    .unwrap_or(content.chunks.len());
                tracing::debug!(content_id = %content.id, "text hash unchanged, skipping");
                return Ok(IndexingResult {
                    content_id: content.id.clone(),
                    status: IndexStatus::Success,
                    chunks_created: existing,
                    embeddings_generated: 0,
                    processing_time_ms: start.elapsed().as_millis() as u64,
                    errors: Vec::new(),
                });
            }
        }

        let strategy = match strategy {
            Some(s) => s,
            None => self
                .config
                .default_strategy
                .parse()
                .unwrap_or(ChunkStrategy::SlidingWindow),
        };
        let chunk_config = ChunkConfig::new(
            self.config.chunk_size,
            self.config.chunk_overlap,
            self.config.min_chunk_size,
        )?;

        let mut chunks = chunker::chunk_text(&content.text, strategy, &chunk_config);
        tracing::debug!(
            content_id = %content.id,
            strategy = strategy.as_str(),
            chunks = chunks.len(),
            "content chunked"
        );

        let mut errors = Vec::new();
        let mut embeddings_generated = 0usize;

        // Full-text embedding first
        let full_embedding = match self.embedder.embed(&content.text).await {
            Ok(embedding) => {
                embeddings_generated += 1;
                Some(embedding)
            }
            Err(e) => {
                errors.push(format!("full-text embedding failed: {e}"));
                None
            }
        };

        // Then all chunk texts
        let chunk_texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let chunk_embeddings = self.embed_chunks(&chunk_texts).await;

        let total_chunks = chunks.len();
        let mut failed_chunks = 0usize;
        for (chunk, outcome) in chunks.iter_mut().zip(chunk_embeddings) {
            match outcome {
                Ok(embedding) => {
                    chunk.embedding = Some(embedding.vector);
                    embeddings_generated += 1;
                }
                Err(e) => {
                    failed_chunks += 1;
                    errors.push(format!("chunk {} embedding failed: {e}", chunk.position));
                }
            }
        }

        let all_chunks_failed = total_chunks > 0 && failed_chunks == total_chunks;

        // Persist whatever embedded successfully
        let mut upsert_failed = false;
        if !all_chunks_failed {
            let records = self.build_records(content, &chunks, full_embedding.as_ref());
            if !records.is_empty() {
                if let Err(e) = self.vectors.upsert(records).await {
                    upsert_failed = true;
                    errors.push(format!("vector upsert failed: {e}"));
                }
            }
        }

        let status = if all_chunks_failed || upsert_failed {
            IndexStatus::Failed
        } else if errors.is_empty() {
            IndexStatus::Success
        } else {
            IndexStatus::Partial
        };

        if status != IndexStatus::Failed {
            self.remember_indexed(content, &chunks, full_embedding, &text_hash)
                .await;
        }

        Ok(IndexingResult {
            content_id: content.id.clone(),
            status,
            chunks_created: total_chunks,
            embeddings_generated,
            processing_time_ms: start.elapsed().as_millis() as u64,
            errors,
        })
    }

    /// Index many contents in groups of `batch_size`
    pub async fn batch_index(
        &self,
        contents: &[Content],
        strategy: Option<ChunkStrategy>,
    ) -> BatchResult {
        let start = Instant::now();
        let mut results = Vec::with_capacity(contents.len());

        for group in contents.chunks(self.config.batch_size.max(1)) {
            let outcomes = join_all(
                group
                    .iter()
                    .map(|content| self.index_content(content, strategy).boxed()),
            )
            .await;

            for (content, outcome) in group.iter().zip(outcomes) {
                match outcome {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        tracing::warn!(content_id = %content.id, "indexing failed: {e}");
                        results.push(IndexingResult::failed(
                            content.id.clone(),
                            e.to_string(),
                            0,
                        ));
                    }
                }
            }
        }

        BatchResult::from_results(results, start.elapsed().as_millis() as u64)
    }

    /// Apply change records for a source
    ///
    /// Creations and updates leave a change marker for the external ingest
    /// flow; deletions drop the content's cache keys and vectors.
    pub async fn update_index(
        &self,
        source_id: &str,
        changes: &[ContentChange],
    ) -> BatchResult {
        let start = Instant::now();
        let mut results = Vec::with_capacity(changes.len());

        for change in changes {
            let outcome = match change.kind {
                ChangeKind::Created | ChangeKind::Updated => {
                    self.cache.record_content_change(change).await
                }
                ChangeKind::Deleted => self.delete_content(&change.content_id).await,
            };

            match outcome {
                Ok(()) => results.push(IndexingResult {
                    content_id: change.content_id.clone(),
                    status: IndexStatus::Success,
                    chunks_created: 0,
                    embeddings_generated: 0,
                    processing_time_ms: 0,
                    errors: Vec::new(),
                }),
                Err(e) => {
                    tracing::warn!(
                        source_id,
                        content_id = %change.content_id,
                        "index update failed: {e}"
                    );
                    results.push(IndexingResult::failed(
                        change.content_id.clone(),
                        e.to_string(),
                        0,
                    ));
                }
            }
        }

        BatchResult::from_results(results, start.elapsed().as_millis() as u64)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Embed chunk texts: one batch call, falling back to bounded per-chunk
    /// embeds so a single failure only skips that chunk
    async fn embed_chunks(&self, texts: &[String]) -> Vec<Result<Embedding>> {
        if texts.is_empty() {
            return Vec::new();
        }

        match self.embedder.embed_batch(texts).await {
            Ok(embeddings) if embeddings.len() == texts.len() => {
                embeddings.into_iter().map(Ok).collect()
            }
            Ok(embeddings) => {
                tracing::warn!(
                    expected = texts.len(),
                    got = embeddings.len(),
                    "batch embedding returned wrong count, retrying individually"
                );
                self.embed_individually(texts).await
            }
            Err(e) => {
                tracing::warn!("batch embedding failed, retrying individually: {e}");
                self.embed_individually(texts).await
            }
        }
    }

    async fn embed_individually(&self, texts: &[String]) -> Vec<Result<Embedding>> {
        let embedder = Arc::clone(&self.embedder);
        stream::iter(texts.to_vec())
            .map(move |text| {
                let embedder = Arc::clone(&embedder);
                async move { embedder.embed(&text).await }.boxed()
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    fn build_records(
        &self,
        content: &Content,
        chunks: &[ContentChunk],
        full_embedding: Option<&Embedding>,
    ) -> Vec<VectorRecord> {
        let extracted = if self.config.extract_metadata {
            Some(self.extractor.extract(&content.text))
        } else {
            None
        };

        let base_metadata = |text: &str, position: Option<u32>| {
            let mut metadata = content.metadata.clone();
            metadata.insert("content_id".to_string(), serde_json::json!(content.id));
            metadata.insert("source_id".to_string(), serde_json::json!(content.source_id));
            metadata.insert("title".to_string(), serde_json::json!(content.title));
            metadata.insert("text".to_string(), serde_json::json!(text));
            metadata.insert(
                "modified_at".to_string(),
                serde_json::json!(content.last_updated.to_rfc3339()),
            );
            if let Some(position) = position {
                metadata.insert("position".to_string(), serde_json::json!(position));
            }
            if let Some(extracted) = &extracted {
                metadata.insert(
                    "language".to_string(),
                    serde_json::json!(extracted.language),
                );
                metadata.insert(
                    "keywords".to_string(),
                    serde_json::json!(extracted.keywords),
                );
            }
            metadata
        };

        let mut records = Vec::with_capacity(chunks.len() + 1);

        if let Some(embedding) = full_embedding {
            records.push(VectorRecord {
                id: content.id.clone(),
                vector: embedding.vector.clone(),
                metadata: base_metadata(&sift_core::truncate_excerpt(&content.text, 500), None),
            });
        }

        for chunk in chunks {
            let Some(vector) = &chunk.embedding else {
                continue;
            };
            records.push(VectorRecord {
                id: format!("{}:{}", content.id, chunk.position),
                vector: vector.clone(),
                metadata: base_metadata(&chunk.text, Some(chunk.position)),
            });
        }

        records
    }

    /// Persist the hash, the indexed marker, and the processed content.
    /// Cache failures are logged, never fatal.
    async fn remember_indexed(
        &self,
        content: &Content,
        chunks: &[ContentChunk],
        full_embedding: Option<Embedding>,
        text_hash: &str,
    ) {
        if let Err(e) = self.cache.set_content_hash(&content.id, text_hash).await {
            tracing::warn!(content_id = %content.id, "failed to store content hash: {e}");
        }

        let marker = serde_json::json!({
            "version": content.version,
            "chunks": chunks.len(),
            "indexed_at": Utc::now().to_rfc3339(),
        });
        if let Err(e) = self.cache.mark_indexed(&content.id, marker).await {
            tracing::warn!(content_id = %content.id, "failed to store index marker: {e}");
        }

        let mut processed = content.clone();
        processed.chunks = chunks.to_vec();
        processed.embedding = full_embedding.map(|e| e.vector);
        processed.last_updated = Utc::now();
        if let Err(e) = self.cache.set_processed_content(&processed).await {
            tracing::warn!(content_id = %content.id, "failed to cache processed content: {e}");
        }
    }

    /// Remove a deleted content's vectors and cache keys
    async fn delete_content(&self, content_id: &str) -> Result<()> {
        // Read the chunk count before the marker is invalidated below
        let chunk_count = self
            .cache
            .get_indexed_marker(content_id)
            .await
            .and_then(|m| m.get("chunks").and_then(|c| c.as_u64()))
            .unwrap_or(0);

        let mut ids: Vec<String> = vec![content_id.to_string()];
        ids.extend((0..chunk_count).map(|i| format!("{content_id}:{i}")));
        self.vectors.delete(&ids).await?;

        self.cache
            .invalidate_matching(&format!("*{content_id}*"))
            .await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
