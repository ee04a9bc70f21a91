//! Query processor
//!
//! Orchestrates the end-to-end query lifecycle:
//! capacity gate -> cache lookup -> parse -> optimize -> fan-out search ->
//! merge/rank -> synthesize -> cache -> emit.
//!
//! `process` never throws across the boundary for pipeline failures: the
//! caller gets a well-formed apology result instead. Only validation and
//! capacity errors surface as errors.

use crate::optimize::QueryOptimizer;
use crate::parse::QueryParser;
use crate::synth::INTERNAL_ERROR_RESPONSE;
use crate::warmer::WarmQueryPipeline;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sift_cache::CacheStore;
use sift_core::config::{ConfigPatch, QueryConfig};
use sift_core::{
    content_text_hash, DataSource, DataSourceRegistry, EmbeddingProvider, FilterOperator,
    ParsedQuery, Query, QueryFilter, QueryOptimization, QueryResult, Result, SearchHit,
    SiftError, SourceRef, Synthesizer,
};
use sift_health::{PerformanceMonitor, QueryRecord};
use sift_search::{HybridOptions, SearchEngine, SearchOptions};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Hard cap on hits kept after merging
const MAX_MERGED_HITS: usize = 100;

/// Source references attached to a result
const MAX_SOURCE_REFS: usize = 10;

/// Top scores feeding the confidence estimate
const CONFIDENCE_SAMPLE: usize = 5;

// ============================================================================
// Usage events and status
// ============================================================================

/// Emitted after each completed query; consumed by the cache warmer
#[derive(Debug, Clone)]
pub struct UsageEvent {
    pub fingerprint: String,
    pub query_text: String,
    pub processing_time_ms: u64,
    pub sources: Vec<String>,
}

/// Externally visible view of an in-flight query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStatus {
    pub query_id: Uuid,
    pub fingerprint: String,
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub source_errors: Vec<String>,
}

/// Processor capacity snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorHealth {
    pub active_queries: usize,
    pub max_concurrent_queries: usize,
    pub utilization: f64,
}

struct ActiveQuery {
    fingerprint: String,
    started_at: DateTime<Utc>,
    started_instant: Instant,
    stage: &'static str,
    cancel: CancellationToken,
    source_errors: Vec<String>,
}

// ============================================================================
// Processor
// ============================================================================

/// End-to-end query pipeline
pub struct QueryProcessor {
    config: tokio::sync::RwLock<QueryConfig>,
    cache: Arc<CacheStore>,
    engine: Arc<SearchEngine>,
    embedder: Arc<dyn EmbeddingProvider>,
    registry: Arc<dyn DataSourceRegistry>,
    synthesizer: Arc<dyn Synthesizer>,
    parser: QueryParser,
    optimizer: QueryOptimizer,
    monitor: Option<Arc<PerformanceMonitor>>,
    usage_tx: Option<mpsc::UnboundedSender<UsageEvent>>,
    active: Mutex<HashMap<Uuid, ActiveQuery>>,
}

impl QueryProcessor {
    pub fn new(
        cache: Arc<CacheStore>,
        engine: Arc<SearchEngine>,
        embedder: Arc<dyn EmbeddingProvider>,
        registry: Arc<dyn DataSourceRegistry>,
        synthesizer: Arc<dyn Synthesizer>,
        config: QueryConfig,
    ) -> Self {
        Self {
            config: tokio::sync::RwLock::new(config),
            cache,
            engine,
            embedder,
            registry,
            synthesizer,
            parser: QueryParser::new(),
            optimizer: QueryOptimizer::new(),
            monitor: None,
            usage_tx: None,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Attach the performance monitor for completion metrics
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Attach the usage-event sink consumed by the cache warmer
    pub fn with_usage_sink(mut self, tx: mpsc::UnboundedSender<UsageEvent>) -> Self {
        self.usage_tx = Some(tx);
        self
    }

    // ------------------------------------------------------------------
    // Public surface
    // ------------------------------------------------------------------

    /// Process a raw text query with optional context
    pub async fn process_text(
        &self,
        text: &str,
        context: Option<HashMap<String, String>>,
    ) -> Result<QueryResult> {
        let mut query = Query::new(text)?;
        if let Some(context) = context {
            query = query.with_context(context);
        }
        self.process(query).await
    }

    /// Process a validated query
    pub async fn process(&self, query: Query) -> Result<QueryResult> {
        self.process_inner(query, true).await
    }

    /// Number of in-flight queries
    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    /// Cancel an in-flight query; true when a record existed
    pub fn cancel(&self, query_id: Uuid) -> bool {
        let removed = self.active.lock().unwrap().remove(&query_id);
        match removed {
            Some(active) => {
                active.cancel.cancel();
                tracing::info!(%query_id, "query cancelled");
                true
            }
            None => false,
        }
    }

    /// Status of an in-flight query
    pub fn query_status(&self, query_id: Uuid) -> Option<QueryStatus> {
        let active = self.active.lock().unwrap();
        active.get(&query_id).map(|entry| QueryStatus {
            query_id,
            fingerprint: entry.fingerprint.clone(),
            stage: entry.stage.to_string(),
            started_at: entry.started_at,
            elapsed_ms: entry.started_instant.elapsed().as_millis() as u64,
            source_errors: entry.source_errors.clone(),
        })
    }

    /// Capacity snapshot
    pub async fn health(&self) -> ProcessorHealth {
        let limit = self.config.read().await.max_concurrent_queries;
        let active = self.active_count();
        ProcessorHealth {
            active_queries: active,
            max_concurrent_queries: limit,
            utilization: if limit == 0 {
                0.0
            } else {
                active as f64 / limit as f64
            },
        }
    }

    /// Current pipeline configuration
    pub async fn config(&self) -> QueryConfig {
        self.config.read().await.clone()
    }

    /// Apply hot-updatable knobs
    pub async fn update_config(&self, patch: &ConfigPatch) {
        let mut config = self.config.write().await;
        if let Some(timeout) = patch.default_timeout_ms {
            config.default_timeout_ms = timeout;
        }
        if let Some(threshold) = patch.min_confidence_threshold {
            config.min_confidence_threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(enabled) = patch.cache_enabled {
            config.cache_enabled = enabled;
        }
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    async fn process_inner(&self, query: Query, track_usage: bool) -> Result<QueryResult> {
        let config = self.config.read().await.clone();
        let start = Instant::now();
        let fingerprint = query.fingerprint();
        let cancel = CancellationToken::new();

        // Capacity gate: rejected queries never occupy a slot
        {
            let mut active = self.active.lock().unwrap();
            if active.len() >= config.max_concurrent_queries {
                tracing::warn!(
                    active = active.len(),
                    limit = config.max_concurrent_queries,
                    "query rejected at capacity gate"
                );
                return Err(SiftError::CapacityExceeded {
                    active: active.len(),
                    limit: config.max_concurrent_queries,
                });
            }
            active.insert(
                query.id,
                ActiveQuery {
                    fingerprint: fingerprint.clone(),
                    started_at: Utc::now(),
                    started_instant: start,
                    stage: "queued",
                    cancel: cancel.clone(),
                    source_errors: Vec::new(),
                },
            );
        }
        let _slot = SlotGuard {
            processor: self,
            id: query.id,
        };

        let deadline = Duration::from_millis(config.default_timeout_ms.max(1));
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(SiftError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
            pipeline = tokio::time::timeout(
                deadline,
                self.run_pipeline(&query, &config, &fingerprint),
            ) => match pipeline {
                Ok(inner) => inner,
                Err(_) => {
                    cancel.cancel();
                    Err(SiftError::Timeout {
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    })
                }
            },
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(mut result) => {
                result.processing_time_ms = elapsed_ms;

                if track_usage {
                    self.emit_usage(&fingerprint, &query.text, elapsed_ms, &result);
                }
                self.record_completion(&query, elapsed_ms, true, &result, None);

                Ok(result)
            }
            Err(e) => match e {
                SiftError::Validation { .. } | SiftError::CapacityExceeded { .. } => Err(e),
                other => {
                    tracing::warn!(query_id = %query.id, code = other.code(), "query failed: {other}");
                    let result = QueryResult::failure(query.id, INTERNAL_ERROR_RESPONSE, elapsed_ms);
                    self.record_completion(&query, elapsed_ms, false, &result, Some(other.code()));
                    Ok(result)
                }
            },
        }
    }

    async fn run_pipeline(
        &self,
        query: &Query,
        config: &QueryConfig,
        fingerprint: &str,
    ) -> Result<QueryResult> {
        // 1. Cache lookup
        if config.cache_enabled {
            self.set_stage(query.id, "cache_lookup");
            if let Some(mut cached) = self.cache.get_query_result(fingerprint).await {
                tracing::debug!(query_id = %query.id, "cache hit");
                cached.id = query.id;
                return Ok(cached);
            }
        }

        // 2. Parse
        self.set_stage(query.id, "parse");
        let parsed = self.parser.parse(query);
        tracing::debug!(query_id = %query.id, intent = ?parsed.intent, "query parsed");

        // 3. Optimize
        let optimization = self.optimizer.optimize(&parsed, query.context.as_ref());

        // 4. Embed once; a failure here aborts the query
        self.set_stage(query.id, "embed");
        let vector = self.query_embedding(&parsed.processed_text).await?;

        // 5. Fan out across active sources
        self.set_stage(query.id, "search");
        let sources = match self.registry.list_active().await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!("data-source listing failed: {e}");
                Vec::new()
            }
        };
        tracing::debug!(query_id = %query.id, sources = sources.len(), "fanning out");

        let hits = if config.enable_parallel_search {
            self.fan_out_parallel(query.id, &sources, &vector, &parsed, &optimization, config)
                .await
        } else {
            self.fan_out_sequential(query.id, &sources, &vector, &parsed, &optimization, config)
                .await
        };

        // 6. Merge, deduplicate, filter, cap
        self.set_stage(query.id, "merge");
        let hits = apply_residual_filters(hits, &optimization.filters);
        let merged = merge_hits(hits, config.min_confidence_threshold);
        tracing::debug!(query_id = %query.id, hits = merged.len(), "merged");

        // 7. Synthesize
        self.set_stage(query.id, "synthesize");
        let refs: Vec<SourceRef> = merged
            .iter()
            .take(MAX_SOURCE_REFS)
            .map(SourceRef::from_hit)
            .collect();
        let confidence = position_weighted_confidence(&merged);
        let response = self.synthesizer.synthesize(&query.text, &refs).await?;

        let result = QueryResult {
            id: query.id,
            response,
            sources: refs,
            confidence,
            processing_time_ms: 0,
            cached: false,
        };

        // 8. Cache store, best-effort
        if config.cache_enabled {
            self.set_stage(query.id, "cache_store");
            if let Err(e) = self.cache.set_query_result(fingerprint, &result, None).await {
                tracing::warn!("failed to cache query result: {e}");
            }
        }

        Ok(result)
    }

    /// Embed the processed query text, consulting the embedding cache first
    async fn query_embedding(&self, processed_text: &str) -> Result<Vec<f32>> {
        let text_hash = content_text_hash(processed_text);
        if let Some(cached) = self.cache.get_embedding(&text_hash).await {
            return Ok(cached.vector);
        }

        let embedding = self.embedder.embed(processed_text).await?;
        if let Err(e) = self.cache.set_embedding(&text_hash, &embedding).await {
            tracing::warn!("failed to cache query embedding: {e}");
        }
        Ok(embedding.vector)
    }

    async fn fan_out_parallel(
        &self,
        query_id: Uuid,
        sources: &[DataSource],
        vector: &[f32],
        parsed: &ParsedQuery,
        optimization: &QueryOptimization,
        config: &QueryConfig,
    ) -> Vec<SearchHit> {
        let searches = sources.iter().map(|source| {
            let options = self.source_options(source, optimization, config);
            async move {
                (
                    source.id.clone(),
                    self.engine
                        .hybrid_search_with_embedding(vector, &parsed.processed_text, &options)
                        .await,
                )
            }
        });

        let mut hits = Vec::new();
        for (source_id, outcome) in join_all(searches).await {
            match outcome {
                Ok(found) => hits.extend(found),
                Err(e) => self.record_source_error(query_id, &source_id, &e),
            }
        }
        hits
    }

    async fn fan_out_sequential(
        &self,
        query_id: Uuid,
        sources: &[DataSource],
        vector: &[f32],
        parsed: &ParsedQuery,
        optimization: &QueryOptimization,
        config: &QueryConfig,
    ) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        for source in sources {
            let options = self.source_options(source, optimization, config);
            match self
                .engine
                .hybrid_search_with_embedding(vector, &parsed.processed_text, &options)
                .await
            {
                Ok(found) => hits.extend(found),
                Err(e) => self.record_source_error(query_id, &source.id, &e),
            }
        }
        hits
    }

    fn source_options(
        &self,
        source: &DataSource,
        optimization: &QueryOptimization,
        config: &QueryConfig,
    ) -> HybridOptions {
        // Equality filters ride to the vector store with the source scope;
        // range and substring filters are applied after retrieval
        let mut filter = HashMap::new();
        filter.insert("source_id".to_string(), serde_json::json!(source.id));
        for query_filter in &optimization.filters {
            if query_filter.operator == FilterOperator::Eq {
                filter.insert(query_filter.field.clone(), query_filter.value.clone());
            }
        }

        let mut options = self
            .engine
            .default_options(SearchOptions::top_k(config.max_results_per_source).with_filter(filter));
        options.keyword_boost = optimization.boosts.clone();
        options.extra_keywords = optimization
            .expanded_terms
            .iter()
            .chain(optimization.synonyms.iter())
            .cloned()
            .collect();
        options
    }

    /// Per-source failures never abort the query; they are logged and kept
    /// in the query context for reporting
    fn record_source_error(&self, query_id: Uuid, source_id: &str, error: &SiftError) {
        tracing::warn!(%query_id, source_id, "source search failed: {error}");
        let mut active = self.active.lock().unwrap();
        if let Some(entry) = active.get_mut(&query_id) {
            entry.source_errors.push(format!("{source_id}: {error}"));
        }
    }

    fn set_stage(&self, query_id: Uuid, stage: &'static str) {
        let mut active = self.active.lock().unwrap();
        if let Some(entry) = active.get_mut(&query_id) {
            entry.stage = stage;
        }
    }

    fn emit_usage(&self, fingerprint: &str, text: &str, elapsed_ms: u64, result: &QueryResult) {
        let Some(tx) = &self.usage_tx else {
            return;
        };
        let sources: Vec<String> = result
            .sources
            .iter()
            .map(|s| s.source_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let _ = tx.send(UsageEvent {
            fingerprint: fingerprint.to_string(),
            query_text: text.to_string(),
            processing_time_ms: elapsed_ms,
            sources,
        });
    }

    fn record_completion(
        &self,
        query: &Query,
        elapsed_ms: u64,
        success: bool,
        result: &QueryResult,
        error_code: Option<&str>,
    ) {
        let Some(monitor) = &self.monitor else {
            return;
        };
        monitor.record_query(QueryRecord {
            query_id: query.id,
            timestamp: Utc::now(),
            response_time_ms: elapsed_ms,
            success,
            cached: result.cached,
            source_count: result.sources.len(),
            confidence: result.confidence,
            user_id: query.user_id.clone(),
            error_code: error_code.map(str::to_string),
        });
    }
}

#[async_trait]
impl WarmQueryPipeline for QueryProcessor {
    /// Warming runs the pipeline without usage tracking so preloads never
    /// inflate their own popularity
    async fn materialize(&self, query_text: &str) -> Result<QueryResult> {
        let query = Query::new(query_text)?;
        self.process_inner(query, false).await
    }
}

/// Releases the in-flight slot on every exit path
struct SlotGuard<'a> {
    processor: &'a QueryProcessor,
    id: Uuid,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.processor.active.lock().unwrap().remove(&self.id);
    }
}

// ============================================================================
// Merging and confidence
// ============================================================================

/// Drop hits that fail the non-equality query filters
///
/// Equality filters are already pushed down to the vector store; range and
/// substring operators are evaluated here against the hit's metadata. The
/// `date` field falls back to the payload's modification timestamps.
pub fn apply_residual_filters(hits: Vec<SearchHit>, filters: &[QueryFilter]) -> Vec<SearchHit> {
    let residual: Vec<&QueryFilter> = filters
        .iter()
        .filter(|f| f.operator != FilterOperator::Eq)
        .collect();
    if residual.is_empty() {
        return hits;
    }

    hits.into_iter()
        .filter(|hit| residual.iter().all(|f| hit_matches_filter(hit, f)))
        .collect()
}

fn hit_matches_filter(hit: &SearchHit, filter: &QueryFilter) -> bool {
    let value = hit.metadata.get(&filter.field).or_else(|| {
        if filter.field == "date" {
            hit.metadata
                .get("modified_at")
                .or_else(|| hit.metadata.get("created_at"))
        } else {
            None
        }
    });
    let Some(value) = value else {
        return false;
    };

    if let (Some(hit_num), Some(filter_num)) = (value.as_f64(), filter.value.as_f64()) {
        return match filter.operator {
            FilterOperator::Eq => hit_num == filter_num,
            FilterOperator::Ne => hit_num != filter_num,
            FilterOperator::Gt => hit_num > filter_num,
            FilterOperator::Gte => hit_num >= filter_num,
            FilterOperator::Lt => hit_num < filter_num,
            FilterOperator::Lte => hit_num <= filter_num,
            FilterOperator::Contains => false,
        };
    }

    let hit_text = match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    };
    let filter_text = match filter.value.as_str() {
        Some(s) => s.to_string(),
        None => filter.value.to_string(),
    };

    match filter.operator {
        FilterOperator::Eq => hit_text == filter_text,
        FilterOperator::Ne => hit_text != filter_text,
        FilterOperator::Contains => hit_text
            .to_lowercase()
            .contains(&filter_text.to_lowercase()),
        FilterOperator::Gt => prefix_cmp(&hit_text, &filter_text).is_gt(),
        FilterOperator::Gte => prefix_cmp(&hit_text, &filter_text).is_ge(),
        FilterOperator::Lt => prefix_cmp(&hit_text, &filter_text).is_lt(),
        FilterOperator::Lte => prefix_cmp(&hit_text, &filter_text).is_le(),
    }
}

/// Compare the hit value against the filter at the filter's precision, so a
/// date-only bound stays inclusive against full timestamps
fn prefix_cmp(hit_value: &str, filter_value: &str) -> std::cmp::Ordering {
    let prefix: String = hit_value
        .chars()
        .take(filter_value.chars().count())
        .collect();
    prefix.as_str().cmp(filter_value)
}

/// Union, sort, deduplicate by content identity (keeping the higher score),
/// drop below-threshold hits, cap the pool
pub fn merge_hits(mut hits: Vec<SearchHit>, min_confidence: f32) -> Vec<SearchHit> {
    sift_search::sort_by_score(&mut hits);

    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(hits.len());
    for hit in hits {
        if hit.final_score < min_confidence {
            continue;
        }
        if seen.insert(hit.dedup_key().to_string()) {
            merged.push(hit);
        }
        if merged.len() >= MAX_MERGED_HITS {
            break;
        }
    }
    merged
}

/// Position-weighted mean of the top scores, weights 1/(1+i)
pub fn position_weighted_confidence(hits: &[SearchHit]) -> f32 {
    if hits.is_empty() {
        return 0.0;
    }

    let mut weighted = 0.0f32;
    let mut weight_sum = 0.0f32;
    for (i, hit) in hits.iter().take(CONFIDENCE_SAMPLE).enumerate() {
        let weight = 1.0 / (1.0 + i as f32);
        weighted += hit.final_score * weight;
        weight_sum += weight;
    }

    (weighted / weight_sum).clamp(0.0, 1.0)
}
