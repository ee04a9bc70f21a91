//! Typed cache store
//!
//! Wraps a `CacheBackend` with the Sift namespaces and JSON envelopes.
//! Backend errors degrade to cache misses; writes are best-effort from the
//! caller's perspective but surface errors for logging.

use crate::keys;
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sift_core::config::CacheConfig;
use sift_core::{
    CacheBackend, Content, ContentChange, Embedding, QueryResult, Result, SiftError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// TTL for change markers, 24 hours
const CHANGE_TTL_SECS: u64 = 86_400;

/// TTL for content text hashes; long-lived so re-index short-circuits keep
/// working between ingest runs
const CONTENT_HASH_TTL_SECS: u64 = 7 * 86_400;

/// Access metadata stored as the `:meta` sibling of each data key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    /// When the entry was written, epoch milliseconds
    pub timestamp_ms: i64,

    /// TTL the entry was written with
    pub ttl_secs: u64,

    /// Reads observed for the entry
    pub access_count: u64,

    /// Last read, epoch milliseconds
    pub last_accessed_ms: i64,
}

impl EntryMeta {
    fn new(ttl_secs: u64) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            timestamp_ms: now,
            ttl_secs,
            access_count: 0,
            last_accessed_ms: now,
        }
    }
}

/// Aggregated cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_keys: u64,
    pub memory_usage_bytes: u64,
    pub evictions: u64,
}

/// Typed cache store over a pluggable backend
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    // ------------------------------------------------------------------
    // Query results
    // ------------------------------------------------------------------

    /// Fetch a cached query result; misses and backend errors both yield
    /// `None` and count as misses
    pub async fn get_query_result(&self, fingerprint: &str) -> Option<QueryResult> {
        self.get_typed::<QueryResult>(&keys::query(fingerprint)).await
    }

    /// Whether a result exists for a fingerprint, without touching hit/miss
    /// counters or access stats; used by the warmer's presence checks
    pub async fn has_query_result(&self, fingerprint: &str) -> bool {
        matches!(
            self.backend.get(&keys::query(fingerprint)).await,
            Ok(Some(_))
        )
    }

    /// Store a query result under its fingerprint with the `cached` flag set
    pub async fn set_query_result(
        &self,
        fingerprint: &str,
        result: &QueryResult,
        ttl_secs: Option<u64>,
    ) -> Result<()> {
        let mut stored = result.clone();
        stored.cached = true;
        let ttl = ttl_secs.unwrap_or(self.config.query_ttl_secs);
        self.set_typed(&keys::query(fingerprint), &stored, ttl).await
    }

    // ------------------------------------------------------------------
    // Embeddings
    // ------------------------------------------------------------------

    pub async fn get_embedding(&self, text_hash: &str) -> Option<Embedding> {
        self.get_typed::<Embedding>(&keys::embedding(text_hash)).await
    }

    pub async fn set_embedding(&self, text_hash: &str, embedding: &Embedding) -> Result<()> {
        self.set_typed(
            &keys::embedding(text_hash),
            embedding,
            self.config.embedding_ttl_secs,
        )
        .await
    }

    /// Batch fetch embeddings, preserving order; a backend error yields all
    /// misses
    pub async fn batch_get_embeddings(&self, text_hashes: &[String]) -> Vec<Option<Embedding>> {
        let data_keys: Vec<String> = text_hashes.iter().map(|h| keys::embedding(h)).collect();

        let raw = match self.backend.mget(&data_keys).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("cache batch get failed: {e}");
                self.misses
                    .fetch_add(text_hashes.len() as u64, Ordering::Relaxed);
                return vec![None; text_hashes.len()];
            }
        };

        raw.into_iter()
            .zip(data_keys)
            .map(|(value, key)| match value {
                Some(raw) => match serde_json::from_str::<Embedding>(&raw) {
                    Ok(embedding) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        self.touch(key);
                        Some(embedding)
                    }
                    Err(_) => {
                        self.misses.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                },
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            })
            .collect()
    }

    /// Batch store embeddings in one pipelined backend write
    pub async fn batch_set_embeddings(&self, entries: &[(String, Embedding)]) -> Result<()> {
        let ttl = self.config.embedding_ttl_secs;
        let mut batch = Vec::with_capacity(entries.len() * 2);
        for (text_hash, embedding) in entries {
            let data_key = keys::embedding(text_hash);
            let data = serde_json::to_string(embedding)
                .map_err(|e| SiftError::Cache(format!("serialize embedding: {e}")))?;
            let meta = serde_json::to_string(&EntryMeta::new(ttl))
                .map_err(|e| SiftError::Cache(format!("serialize meta: {e}")))?;
            batch.push((keys::meta(&data_key), ttl, meta));
            batch.push((data_key, ttl, data));
        }
        self.backend.set_many(batch).await
    }

    // ------------------------------------------------------------------
    // Processed content
    // ------------------------------------------------------------------

    pub async fn get_processed_content(&self, content_id: &str) -> Option<Content> {
        self.get_typed::<Content>(&keys::content(content_id)).await
    }

    pub async fn set_processed_content(&self, content: &Content) -> Result<()> {
        self.set_typed(
            &keys::content(&content.id),
            content,
            self.config.embedding_ttl_secs,
        )
        .await
    }

    // ------------------------------------------------------------------
    // Indexing markers
    // ------------------------------------------------------------------

    /// Stored text hash for a content id, when present
    pub async fn get_content_hash(&self, content_id: &str) -> Option<String> {
        self.backend
            .get(&keys::content_hash(content_id))
            .await
            .ok()
            .flatten()
    }

    /// Remember the text hash observed for a content id
    pub async fn set_content_hash(&self, content_id: &str, text_hash: &str) -> Result<()> {
        self.backend
            .set_ex(
                &keys::content_hash(content_id),
                CONTENT_HASH_TTL_SECS,
                text_hash.to_string(),
            )
            .await
    }

    /// Record a change marker consumed by the external ingest flow
    pub async fn record_content_change(&self, change: &ContentChange) -> Result<()> {
        let key = keys::content_change(&change.content_id, change.timestamp.timestamp_millis());
        let value = serde_json::to_string(change)
            .map_err(|e| SiftError::Cache(format!("serialize change: {e}")))?;
        self.backend.set_ex(&key, CHANGE_TTL_SECS, value).await
    }

    /// Record that a content id has been indexed
    pub async fn mark_indexed(&self, content_id: &str, detail: serde_json::Value) -> Result<()> {
        self.backend
            .set_ex(
                &keys::indexed_content(content_id),
                self.config.embedding_ttl_secs,
                detail.to_string(),
            )
            .await
    }

    /// Read back the indexed marker for a content id, when present
    pub async fn get_indexed_marker(&self, content_id: &str) -> Option<serde_json::Value> {
        let raw = self
            .backend
            .get(&keys::indexed_content(content_id))
            .await
            .ok()
            .flatten()?;
        serde_json::from_str(&raw).ok()
    }

    // ------------------------------------------------------------------
    // Invalidation and maintenance
    // ------------------------------------------------------------------

    /// Delete all keys in a namespace matching an optional sub-pattern;
    /// defaults to the whole namespace. Returns the count deleted.
    pub async fn invalidate(&self, namespace: &str, pattern: Option<&str>) -> Result<u64> {
        let full = match pattern {
            Some(p) => format!("{namespace}:{p}"),
            None => format!("{namespace}:*"),
        };
        self.invalidate_matching(&full).await
    }

    /// Delete all keys matching a raw glob pattern across namespaces
    pub async fn invalidate_matching(&self, pattern: &str) -> Result<u64> {
        let matched = self.backend.keys(pattern).await?;
        if matched.is_empty() {
            return Ok(0);
        }
        let deleted = self.backend.del(&matched).await?;
        tracing::debug!(pattern, deleted, "cache invalidation");
        Ok(deleted)
    }

    /// Drop every key and reset counters
    pub async fn clear_all(&self) -> Result<u64> {
        let deleted = self.invalidate_matching("*").await?;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        Ok(deleted)
    }

    /// Aggregated statistics
    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };

        let total_keys = self.backend.dbsize().await.unwrap_or(0);
        let info = self.backend.info().await.unwrap_or_default();

        CacheStats {
            hits,
            misses,
            hit_rate,
            total_keys,
            memory_usage_bytes: info.used_memory_bytes,
            evictions: info.evictions,
        }
    }

    /// Round-trip liveness check against the backend
    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    self.touch(key.to_string());
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(key, "cache entry failed to deserialize: {e}");
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::warn!(key, "cache read failed: {e}");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set_typed<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        let data = serde_json::to_string(value)
            .map_err(|e| SiftError::Cache(format!("serialize cache value: {e}")))?;
        let meta = serde_json::to_string(&EntryMeta::new(ttl_secs))
            .map_err(|e| SiftError::Cache(format!("serialize meta: {e}")))?;

        self.backend.set_ex(key, ttl_secs, data).await?;
        self.backend
            .set_ex(&keys::meta(key), ttl_secs, meta)
            .await?;
        Ok(())
    }

    /// Bump access stats for a data key, detached and best-effort
    fn touch(&self, data_key: String) {
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            let meta_key = keys::meta(&data_key);
            let Ok(Some(raw)) = backend.get(&meta_key).await else {
                return;
            };
            let Ok(mut meta) = serde_json::from_str::<EntryMeta>(&raw) else {
                return;
            };
            meta.access_count += 1;
            meta.last_accessed_ms = Utc::now().timestamp_millis();
            if let Ok(updated) = serde_json::to_string(&meta) {
                // Failures here never surface; stats are advisory
                let _ = backend.set_ex(&meta_key, meta.ttl_secs, updated).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use sift_core::QueryResult;
    use uuid::Uuid;

    fn store() -> CacheStore {
        CacheStore::new(
            Arc::new(MemoryBackend::new(16 * 1024 * 1024)),
            CacheConfig::default(),
        )
    }

    fn sample_result() -> QueryResult {
        QueryResult {
            id: Uuid::new_v4(),
            response: "An answer".to_string(),
            sources: Vec::new(),
            confidence: 0.9,
            processing_time_ms: 42,
            cached: false,
        }
    }

    #[tokio::test]
    async fn test_query_result_roundtrip_sets_cached_flag() {
        let store = store();
        let result = sample_result();

        store.set_query_result("fp1", &result, None).await.unwrap();
        let cached = store.get_query_result("fp1").await.unwrap();

        assert!(cached.cached);
        assert_eq!(cached.response, result.response);
        assert_eq!(cached.confidence, result.confidence);
    }

    #[tokio::test]
    async fn test_miss_counts() {
        let store = store();
        assert!(store.get_query_result("absent").await.is_none());

        let stats = store.stats().await;
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[tokio::test]
    async fn test_hit_rate() {
        let store = store();
        let result = sample_result();
        store.set_query_result("fp1", &result, None).await.unwrap();

        store.get_query_result("fp1").await;
        store.get_query_result("fp1").await;
        store.get_query_result("nope").await;

        let stats = store.stats().await;
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_embedding_batch_roundtrip() {
        let store = store();
        let entries = vec![
            ("h1".to_string(), Embedding::new(vec![0.1, 0.2], "m")),
            ("h2".to_string(), Embedding::new(vec![0.3, 0.4], "m")),
        ];
        store.batch_set_embeddings(&entries).await.unwrap();

        let got = store
            .batch_get_embeddings(&["h1".to_string(), "h3".to_string(), "h2".to_string()])
            .await;
        assert!(got[0].is_some());
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().unwrap().vector, vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_content_hash_marker() {
        let store = store();
        assert!(store.get_content_hash("doc-1").await.is_none());

        store.set_content_hash("doc-1", "1z5k9").await.unwrap();
        assert_eq!(store.get_content_hash("doc-1").await.unwrap(), "1z5k9");
    }

    #[tokio::test]
    async fn test_invalidate_namespace() {
        let store = store();
        let result = sample_result();
        store.set_query_result("fp1", &result, None).await.unwrap();
        store.set_query_result("fp2", &result, None).await.unwrap();
        store.set_content_hash("doc-1", "h").await.unwrap();

        // Each query entry has a data key and a meta sibling
        let deleted = store.invalidate(crate::keys::QUERY_NS, None).await.unwrap();
        assert_eq!(deleted, 4);

        assert!(store.get_query_result("fp1").await.is_none());
        assert!(store.get_content_hash("doc-1").await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_prefix_pattern() {
        let store = store();
        let result = sample_result();
        store.set_query_result("abcd1234", &result, None).await.unwrap();
        store.set_query_result("abzz9999", &result, None).await.unwrap();

        let deleted = store
            .invalidate(crate::keys::QUERY_NS, Some("abcd*"))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(store.get_query_result("abcd1234").await.is_none());
        assert!(store.get_query_result("abzz9999").await.is_some());
    }

    #[tokio::test]
    async fn test_clear_all_resets_counters() {
        let store = store();
        let result = sample_result();
        store.set_query_result("fp1", &result, None).await.unwrap();
        store.get_query_result("fp1").await;
        store.get_query_result("missing").await;

        store.clear_all().await.unwrap();

        assert!(store.get_query_result("fp1").await.is_none());
        let stats = store.stats().await;
        // The read above registered as the first post-clear miss
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_change_marker_written() {
        let store = store();
        let change = ContentChange::new("doc-9", sift_core::ChangeKind::Deleted);
        store.record_content_change(&change).await.unwrap();

        let deleted = store.invalidate_matching("content_change:doc-9:*").await.unwrap();
        assert_eq!(deleted, 1);
    }
}
