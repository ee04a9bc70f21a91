//! End-to-end pipeline tests with mock collaborators

use async_trait::async_trait;
use sift_cache::{CacheStore, MemoryBackend};
use sift_core::config::{CacheConfig, HealthThresholds, QueryConfig, SearchConfig};
use sift_core::{
    DataSource, DataSourceRegistry, Embedding, EmbeddingProvider, ProviderHealth, QueryResult,
    Result, ScoredPoint, SearchParams, SiftError, SourceHealth, VectorRecord, VectorStore,
    VectorStoreStats,
};
use sift_health::PerformanceMonitor;
use sift_query::{QueryProcessor, TemplateSynthesizer, INTERNAL_ERROR_RESPONSE, NO_RESULTS_RESPONSE};
use sift_search::SearchEngine;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Mocks
// ============================================================================

struct HashEmbedder;

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let seed = text.len() as f32;
        Ok(Embedding::new(vec![seed, 1.0, 0.5], "hash-model"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    async fn health(&self) -> Result<ProviderHealth> {
        Ok(ProviderHealth::healthy())
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Store serving canned hits per source, optionally failing one source or
/// delaying every search; every search's filter is recorded for assertions
struct ScriptedStore {
    hits_by_source: HashMap<String, Vec<ScoredPoint>>,
    failing_source: Option<String>,
    delay: Option<Duration>,
    recorded_filters: Mutex<Vec<HashMap<String, serde_json::Value>>>,
}

impl ScriptedStore {
    fn new(hits_by_source: HashMap<String, Vec<ScoredPoint>>) -> Self {
        Self {
            hits_by_source,
            failing_source: None,
            delay: None,
            recorded_filters: Mutex::new(Vec::new()),
        }
    }

    fn failing_for(mut self, source_id: &str) -> Self {
        self.failing_source = Some(source_id.to_string());
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl VectorStore for ScriptedStore {
    async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<()> {
        Ok(())
    }

    async fn search(&self, _vector: &[f32], params: &SearchParams) -> Result<Vec<ScoredPoint>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.recorded_filters
            .lock()
            .unwrap()
            .push(params.filter.clone().unwrap_or_default());

        let source_id = params
            .filter
            .as_ref()
            .and_then(|f| f.get("source_id"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if self.failing_source.as_deref() == Some(source_id.as_str()) {
            return Err(SiftError::Provider(format!("source {source_id} exploded")));
        }

        Ok(self
            .hits_by_source
            .get(&source_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(params.top_k)
            .collect())
    }

    async fn delete(&self, _ids: &[String]) -> Result<u64> {
        Ok(0)
    }

    async fn stats(&self) -> Result<VectorStoreStats> {
        Ok(VectorStoreStats {
            total_vectors: 0,
            dimension: 3,
            index_type: "scripted".to_string(),
            last_updated: None,
        })
    }

    async fn health(&self) -> Result<ProviderHealth> {
        Ok(ProviderHealth::healthy())
    }
}

struct TwoSourceRegistry;

#[async_trait]
impl DataSourceRegistry for TwoSourceRegistry {
    async fn list_active(&self) -> Result<Vec<DataSource>> {
        Ok(vec![
            DataSource::new("s1", "Source One", "api"),
            DataSource::new("s2", "Source Two", "api"),
        ])
    }

    async fn probe(&self, _source_id: &str) -> Result<SourceHealth> {
        Ok(SourceHealth::healthy(1))
    }
}

fn point(id: &str, source: &str, score: f32, text: &str) -> ScoredPoint {
    let mut metadata = HashMap::new();
    metadata.insert("content_id".to_string(), serde_json::json!(id));
    metadata.insert("source_id".to_string(), serde_json::json!(source));
    metadata.insert("source_name".to_string(), serde_json::json!("Source"));
    metadata.insert("title".to_string(), serde_json::json!(format!("Doc {id}")));
    metadata.insert("text".to_string(), serde_json::json!(text));
    ScoredPoint {
        id: id.to_string(),
        score,
        metadata,
    }
}

fn processor_with(store: ScriptedStore, config: QueryConfig) -> (Arc<QueryProcessor>, Arc<CacheStore>) {
    processor_with_store(Arc::new(store), config)
}

fn processor_with_store(
    store: Arc<ScriptedStore>,
    config: QueryConfig,
) -> (Arc<QueryProcessor>, Arc<CacheStore>) {
    let cache = Arc::new(CacheStore::new(
        Arc::new(MemoryBackend::new(16 * 1024 * 1024)),
        CacheConfig::default(),
    ));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder);
    let engine = Arc::new(SearchEngine::new(
        embedder.clone(),
        store,
        SearchConfig::default(),
    ));
    let processor = QueryProcessor::new(
        cache.clone(),
        engine,
        embedder,
        Arc::new(TwoSourceRegistry),
        Arc::new(TemplateSynthesizer),
        config,
    );
    (Arc::new(processor), cache)
}

fn default_hits() -> HashMap<String, Vec<ScoredPoint>> {
    let mut hits = HashMap::new();
    hits.insert(
        "s1".to_string(),
        vec![
            point("a1", "s1", 0.92, "alpha text about rust"),
            point("a2", "s1", 0.80, "more alpha text"),
        ],
    );
    hits.insert(
        "s2".to_string(),
        vec![point("b1", "s2", 0.85, "beta text about rust")],
    );
    hits
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_full_pipeline_produces_ranked_result() {
    let (processor, _cache) = processor_with(
        ScriptedStore::new(default_hits()),
        QueryConfig::default(),
    );

    let result = processor
        .process_text("tell me about rust", None)
        .await
        .unwrap();

    assert!(!result.cached);
    assert_eq!(result.sources.len(), 3);
    assert_eq!(result.sources[0].content_id, "a1");
    assert!(result.confidence > 0.0);
    assert!(!result.response.is_empty());
    assert_ne!(result.response, INTERNAL_ERROR_RESPONSE);
}

#[tokio::test]
async fn test_cache_hit_returns_preloaded_result() {
    let (processor, cache) = processor_with(
        ScriptedStore::new(default_hits()),
        QueryConfig::default(),
    );

    let fingerprint = sift_core::query_fingerprint("machine learning", None, None);
    let preloaded = QueryResult {
        id: Uuid::new_v4(),
        response: "A preloaded answer".to_string(),
        sources: Vec::new(),
        confidence: 0.9,
        processing_time_ms: 1234,
        cached: false,
    };
    cache
        .set_query_result(&fingerprint, &preloaded, None)
        .await
        .unwrap();

    let result = processor
        .process_text("machine learning", None)
        .await
        .unwrap();

    assert!(result.cached);
    assert_eq!(result.response, "A preloaded answer");
    assert_eq!(result.confidence, 0.9);
    assert!(result.processing_time_ms < 1000);
}

#[tokio::test]
async fn test_cache_idempotence() {
    let (processor, _cache) = processor_with(
        ScriptedStore::new(default_hits()),
        QueryConfig::default(),
    );

    let first = processor.process_text("rust runtime", None).await.unwrap();
    let second = processor.process_text("rust runtime", None).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.response, second.response);
    assert_eq!(first.confidence, second.confidence);
    assert_eq!(first.sources.len(), second.sources.len());
}

#[tokio::test]
async fn test_partial_source_failure_keeps_healthy_hits() {
    let (processor, _cache) = processor_with(
        ScriptedStore::new(default_hits()).failing_for("s2"),
        QueryConfig::default(),
    );

    let result = processor
        .process_text("tell me about rust", None)
        .await
        .unwrap();

    // Only hits from the healthy source survive, and a response is still
    // synthesized
    assert_eq!(result.sources.len(), 2);
    assert!(result.sources.iter().all(|s| s.source_id == "s1"));
    assert!(result.confidence > 0.0);
    assert_ne!(result.response, INTERNAL_ERROR_RESPONSE);
}

#[tokio::test]
async fn test_sequential_fanout_matches_parallel() {
    let config = QueryConfig {
        enable_parallel_search: false,
        ..Default::default()
    };
    let (processor, _cache) = processor_with(ScriptedStore::new(default_hits()), config);

    let result = processor
        .process_text("tell me about rust", None)
        .await
        .unwrap();
    assert_eq!(result.sources.len(), 3);
    assert_eq!(result.sources[0].content_id, "a1");
}

#[tokio::test]
async fn test_no_hits_yields_no_results_apology() {
    let (processor, _cache) = processor_with(
        ScriptedStore::new(HashMap::new()),
        QueryConfig::default(),
    );

    let result = processor.process_text("anything at all", None).await.unwrap();
    assert_eq!(result.response, NO_RESULTS_RESPONSE);
    assert!(result.sources.is_empty());
    assert_eq!(result.confidence, 0.0);
}

#[tokio::test]
async fn test_capacity_gate_rejects_excess() {
    let config = QueryConfig {
        max_concurrent_queries: 1,
        ..Default::default()
    };
    let (processor, _cache) = processor_with(
        ScriptedStore::new(default_hits()).with_delay(Duration::from_millis(300)),
        config,
    );

    let background = {
        let processor = processor.clone();
        tokio::spawn(async move { processor.process_text("first slow query", None).await })
    };

    // Let the first query claim its slot
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(processor.active_count(), 1);

    let err = processor
        .process_text("second query", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CAPACITY_EXCEEDED");

    let first = background.await.unwrap().unwrap();
    assert!(!first.sources.is_empty());

    // The slot is released once the query completes
    assert_eq!(processor.active_count(), 0);
}

#[tokio::test]
async fn test_timeout_returns_apology_result() {
    let config = QueryConfig {
        default_timeout_ms: 50,
        ..Default::default()
    };
    let (processor, _cache) = processor_with(
        ScriptedStore::new(default_hits()).with_delay(Duration::from_millis(400)),
        config,
    );

    let result = processor.process_text("slow query", None).await.unwrap();
    assert_eq!(result.response, INTERNAL_ERROR_RESPONSE);
    assert_eq!(result.confidence, 0.0);
    assert!(result.sources.is_empty());
    assert_eq!(processor.active_count(), 0);
}

#[tokio::test]
async fn test_validation_error_surfaces() {
    let (processor, _cache) = processor_with(
        ScriptedStore::new(default_hits()),
        QueryConfig::default(),
    );

    let err = processor.process_text("   ", None).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION");
}

#[tokio::test]
async fn test_min_confidence_threshold_filters_hits() {
    let config = QueryConfig {
        min_confidence_threshold: 0.99,
        ..Default::default()
    };
    let (processor, _cache) = processor_with(ScriptedStore::new(default_hits()), config);

    let result = processor.process_text("rust things", None).await.unwrap();
    assert!(result.sources.is_empty());
    assert_eq!(result.response, NO_RESULTS_RESPONSE);
}

#[tokio::test]
async fn test_inline_type_filter_reaches_the_store() {
    let store = Arc::new(ScriptedStore::new(default_hits()));
    let (processor, _cache) = processor_with_store(store.clone(), QueryConfig::default());

    processor
        .process_text("installation manuals type:pdf", None)
        .await
        .unwrap();

    let recorded = store.recorded_filters.lock().unwrap();
    // One search per active source, each carrying the parsed filter
    assert_eq!(recorded.len(), 2);
    for filter in recorded.iter() {
        assert_eq!(filter.get("type"), Some(&serde_json::json!("pdf")));
        assert!(filter.contains_key("source_id"));
    }
}

#[tokio::test]
async fn test_inline_date_filter_excludes_stale_hits() {
    let mut fresh = point("fresh", "s1", 0.80, "quarterly report");
    fresh.metadata.insert(
        "modified_at".to_string(),
        serde_json::json!("2024-06-01T12:00:00Z"),
    );
    let mut stale = point("stale", "s1", 0.95, "ancient report");
    stale.metadata.insert(
        "modified_at".to_string(),
        serde_json::json!("2022-01-15T12:00:00Z"),
    );

    let mut hits = HashMap::new();
    hits.insert("s1".to_string(), vec![stale, fresh]);

    let (processor, _cache) = processor_with(ScriptedStore::new(hits), QueryConfig::default());

    let result = processor
        .process_text("report since 2024-01-01", None)
        .await
        .unwrap();

    // The higher-scoring stale hit is gone; only the in-range hit remains
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].content_id, "fresh");
}

#[tokio::test]
async fn test_synonym_expansion_broadens_keyword_scoring() {
    let mut hits = HashMap::new();
    hits.insert(
        "s1".to_string(),
        vec![
            point("expanded", "s1", 0.6, "natural language processing in depth"),
            point("plain", "s1", 0.6, "gardening on a balcony"),
        ],
    );

    let (processor, _cache) = processor_with(ScriptedStore::new(hits), QueryConfig::default());

    // "NLP" is detected as an entity and expanded via the synonym table
    let result = processor
        .process_text("What does NLP cover", None)
        .await
        .unwrap();

    assert_eq!(result.sources.len(), 2);
    assert_eq!(result.sources[0].content_id, "expanded");
    assert!(result.sources[0].relevance_score > result.sources[1].relevance_score);
}

#[tokio::test]
async fn test_monitor_records_completions() {
    let cache = Arc::new(CacheStore::new(
        Arc::new(MemoryBackend::new(16 * 1024 * 1024)),
        CacheConfig::default(),
    ));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder);
    let engine = Arc::new(SearchEngine::new(
        embedder.clone(),
        Arc::new(ScriptedStore::new(default_hits())),
        SearchConfig::default(),
    ));
    let monitor = Arc::new(PerformanceMonitor::new(HealthThresholds::default()));
    let processor = QueryProcessor::new(
        cache,
        engine,
        embedder,
        Arc::new(TwoSourceRegistry),
        Arc::new(TemplateSynthesizer),
        QueryConfig::default(),
    )
    .with_monitor(monitor.clone());

    processor.process_text("rust query", None).await.unwrap();
    processor.process_text("rust query", None).await.unwrap();

    let metrics = monitor.performance();
    assert_eq!(metrics.total_queries, 2);
    assert_eq!(metrics.successful_queries, 2);
    assert_eq!(metrics.cached_queries, 1);
}

#[tokio::test]
async fn test_usage_events_emitted() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let cache = Arc::new(CacheStore::new(
        Arc::new(MemoryBackend::new(16 * 1024 * 1024)),
        CacheConfig::default(),
    ));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder);
    let engine = Arc::new(SearchEngine::new(
        embedder.clone(),
        Arc::new(ScriptedStore::new(default_hits())),
        SearchConfig::default(),
    ));
    let processor = QueryProcessor::new(
        cache,
        engine,
        embedder,
        Arc::new(TwoSourceRegistry),
        Arc::new(TemplateSynthesizer),
        QueryConfig::default(),
    )
    .with_usage_sink(tx);

    processor.process_text("rust query", None).await.unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(
        event.fingerprint,
        sift_core::query_fingerprint("rust query", None, None)
    );
    assert_eq!(event.query_text, "rust query");
    assert!(event.sources.contains(&"s1".to_string()));
    assert!(event.sources.contains(&"s2".to_string()));
}

#[tokio::test]
async fn test_query_status_visible_while_running() {
    let (processor, _cache) = processor_with(
        ScriptedStore::new(default_hits()).with_delay(Duration::from_millis(200)),
        QueryConfig::default(),
    );

    let query = sift_core::Query::new("watched query").unwrap();
    let query_id = query.id;

    let background = {
        let processor = processor.clone();
        tokio::spawn(async move { processor.process(query).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = processor.query_status(query_id).expect("query is in flight");
    assert_eq!(status.query_id, query_id);
    assert_eq!(status.stage, "search");
    assert!(status.elapsed_ms >= 40);

    background.await.unwrap().unwrap();
    assert_eq!(processor.active_count(), 0);
    assert!(processor.query_status(query_id).is_none());
}

#[tokio::test]
async fn test_cancel_inflight_query() {
    let (processor, _cache) = processor_with(
        ScriptedStore::new(default_hits()).with_delay(Duration::from_millis(500)),
        QueryConfig::default(),
    );

    let query = sift_core::Query::new("doomed query").unwrap();
    let query_id = query.id;

    let background = {
        let processor = processor.clone();
        tokio::spawn(async move { processor.process(query).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(processor.cancel(query_id));
    assert_eq!(processor.active_count(), 0);

    // The cancelled query resolves to an apology result, not a hang
    let result = background.await.unwrap().unwrap();
    assert_eq!(result.response, INTERNAL_ERROR_RESPONSE);
    assert_eq!(result.confidence, 0.0);

    // Cancelling an unknown id reports false
    assert!(!processor.cancel(Uuid::new_v4()));
}
