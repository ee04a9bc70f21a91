//! Cache warming
//!
//! Maintains a popularity model from query usage events and proactively
//! exercises the query pipeline for hot fingerprints so user-facing requests
//! hit the cache. At most one warming pass runs at any time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sift_cache::{keys, CacheStore};
use sift_core::config::{ConfigPatch, WarmerConfig};
use sift_core::{QueryResult, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::processor::UsageEvent;

/// Fingerprint prefix length used for the pattern table
const PATTERN_PREFIX_LEN: usize = 8;

/// Batches of candidates considered per preload pass
const PRELOAD_CANDIDATE_BATCHES: usize = 4;

/// Pause between preload batches
const PRELOAD_PAUSE_MS: u64 = 100;

/// Patterns warmed per tick
const PATTERNS_PER_TICK: usize = 5;

/// Stats warmed per pattern
const STATS_PER_PATTERN: usize = 3;

/// Minimum pattern priority considered warm-worthy
const PATTERN_PRIORITY_FLOOR: f64 = 0.5;

/// Capability the warmer needs from the query pipeline
#[async_trait]
pub trait WarmQueryPipeline: Send + Sync {
    /// Run the pipeline for a query so its result lands in the cache
    async fn materialize(&self, query_text: &str) -> Result<QueryResult>;
}

/// Usage statistics for one query fingerprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStat {
    pub fingerprint: String,

    /// Original query text, kept so evicted results can be re-materialized
    pub query_text: String,

    pub count: u64,
    pub last_accessed: DateTime<Utc>,

    /// Exponential-recency estimate: updated as `(old + new) / 2`
    pub avg_processing_ms: f64,

    /// Sources that contributed to results for this query
    pub sources: Vec<String>,
}

/// Aggregated stats for a fingerprint prefix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternStat {
    pub frequency: u64,
    pub last_used: DateTime<Utc>,
    pub priority: f64,
}

/// Popularity-driven cache warmer
pub struct CacheWarmer {
    cache: Arc<CacheStore>,
    pipeline: Arc<dyn WarmQueryPipeline>,
    config: RwLock<WarmerConfig>,
    usage: Mutex<HashMap<String, UsageStat>>,
    patterns: Mutex<HashMap<String, PatternStat>>,
    is_warming: AtomicBool,
    loop_token: Mutex<Option<CancellationToken>>,
}

impl CacheWarmer {
    pub fn new(
        cache: Arc<CacheStore>,
        pipeline: Arc<dyn WarmQueryPipeline>,
        config: WarmerConfig,
    ) -> Self {
        Self {
            cache,
            pipeline,
            config: RwLock::new(config),
            usage: Mutex::new(HashMap::new()),
            patterns: Mutex::new(HashMap::new()),
            is_warming: AtomicBool::new(false),
            loop_token: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Apply one usage event to the popularity model
    pub fn track(&self, event: &UsageEvent) {
        self.track_at(event, Utc::now());
    }

    /// Clock-injected body of `track`
    fn track_at(&self, event: &UsageEvent, now: DateTime<Utc>) {
        let max_age_secs = self.config.read().unwrap().max_age_secs;

        {
            let mut usage = self.usage.lock().unwrap();
            usage
                .entry(event.fingerprint.clone())
                .and_modify(|stat| {
                    stat.count += 1;
                    stat.last_accessed = now;
                    stat.avg_processing_ms =
                        (stat.avg_processing_ms + event.processing_time_ms as f64) / 2.0;
                    for source in &event.sources {
                        if !stat.sources.contains(source) {
                            stat.sources.push(source.clone());
                        }
                    }
                })
                .or_insert_with(|| UsageStat {
                    fingerprint: event.fingerprint.clone(),
                    query_text: event.query_text.clone(),
                    count: 1,
                    last_accessed: now,
                    avg_processing_ms: event.processing_time_ms as f64,
                    sources: event.sources.clone(),
                });
        }

        let prefix: String = event.fingerprint.chars().take(PATTERN_PREFIX_LEN).collect();
        let mut patterns = self.patterns.lock().unwrap();
        let entry = patterns.entry(prefix).or_insert_with(|| PatternStat {
            frequency: 0,
            last_used: now,
            priority: 0.0,
        });
        entry.frequency += 1;

        // Recency decays with the gap since the pattern's previous use
        let age_secs = (now - entry.last_used).num_seconds().max(0) as f64;
        entry.last_used = now;

        let recency = (1.0 - age_secs / max_age_secs.max(1) as f64).max(0.0);
        entry.priority = 0.6 * recency + 0.4 * (entry.frequency as f64 / 100.0).min(1.0);
    }

    /// Fingerprints ranked by popularity: fresh enough, accessed often
    /// enough, ordered by `count / (age + 1)`
    pub fn popular(&self, limit: usize) -> Vec<String> {
        let config = self.config.read().unwrap().clone();
        let now = Utc::now();

        let usage = self.usage.lock().unwrap();
        let mut candidates: Vec<(f64, &UsageStat)> = usage
            .values()
            .filter(|stat| {
                let age_secs = (now - stat.last_accessed).num_seconds().max(0) as u64;
                age_secs < config.max_age_secs && stat.count >= config.popularity_threshold
            })
            .map(|stat| {
                let age_secs = (now - stat.last_accessed).num_seconds().max(0) as f64;
                (stat.count as f64 / (age_secs + 1.0), stat)
            })
            .collect();

        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        candidates
            .into_iter()
            .take(limit)
            .map(|(_, stat)| stat.fingerprint.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Warming
    // ------------------------------------------------------------------

    /// Preload popular fingerprints; bails when a pass is already running
    pub async fn preload_hot(&self) {
        if self.is_warming.swap(true, Ordering::SeqCst) {
            tracing::debug!("warming already in progress, skipping");
            return;
        }
        self.preload_hot_inner().await;
        self.is_warming.store(false, Ordering::SeqCst);
    }

    /// One full warming tick: prune stale stats, preload popular
    /// fingerprints, then warm the top patterns
    pub async fn tick(&self) {
        if self.is_warming.swap(true, Ordering::SeqCst) {
            tracing::debug!("warming already in progress, skipping tick");
            return;
        }
        self.cleanup();
        self.preload_hot_inner().await;
        self.warm_top_patterns_inner().await;
        self.is_warming.store(false, Ordering::SeqCst);
    }

    async fn preload_hot_inner(&self) {
        let batch_size = {
            let config = self.config.read().unwrap();
            config.preload_batch_size.max(1)
        };

        let candidates = self.popular(batch_size * PRELOAD_CANDIDATE_BATCHES);
        if candidates.is_empty() {
            return;
        }
        tracing::debug!(candidates = candidates.len(), "preloading hot fingerprints");

        let mut first = true;
        for batch in candidates.chunks(batch_size) {
            if !first {
                tokio::time::sleep(std::time::Duration::from_millis(PRELOAD_PAUSE_MS)).await;
            }
            first = false;

            for fingerprint in batch {
                self.warm_fingerprint(fingerprint).await;
            }
        }
    }

    async fn warm_top_patterns_inner(&self) {
        let top_patterns: Vec<String> = {
            let patterns = self.patterns.lock().unwrap();
            let mut ranked: Vec<(&String, &PatternStat)> = patterns
                .iter()
                .filter(|(_, stat)| stat.priority > PATTERN_PRIORITY_FLOOR)
                .collect();
            ranked.sort_by(|a, b| {
                b.1.priority
                    .partial_cmp(&a.1.priority)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            ranked
                .into_iter()
                .take(PATTERNS_PER_TICK)
                .map(|(prefix, _)| prefix.clone())
                .collect()
        };

        for prefix in top_patterns {
            let fingerprints: Vec<String> = {
                let usage = self.usage.lock().unwrap();
                usage
                    .keys()
                    .filter(|fp| fp.starts_with(&prefix))
                    .take(STATS_PER_PATTERN)
                    .cloned()
                    .collect()
            };
            for fingerprint in fingerprints {
                self.warm_fingerprint(&fingerprint).await;
            }
        }
    }

    /// Materialize one fingerprint unless its result is already cached
    async fn warm_fingerprint(&self, fingerprint: &str) {
        if self.cache.has_query_result(fingerprint).await {
            return;
        }

        let query_text = {
            let usage = self.usage.lock().unwrap();
            usage.get(fingerprint).map(|stat| stat.query_text.clone())
        };
        let Some(query_text) = query_text else {
            return;
        };

        match self.pipeline.materialize(&query_text).await {
            Ok(_) => tracing::debug!(fingerprint, "warmed"),
            Err(e) => tracing::warn!(fingerprint, "warming failed: {e}"),
        }
    }

    // ------------------------------------------------------------------
    // Invalidation and cleanup
    // ------------------------------------------------------------------

    /// Drop cached results and stats for every query that touched a source
    pub async fn invalidate_for_source(&self, source_id: &str) -> Result<u64> {
        let affected: Vec<String> = {
            let usage = self.usage.lock().unwrap();
            usage
                .values()
                .filter(|stat| stat.sources.iter().any(|s| s == source_id))
                .map(|stat| stat.fingerprint.clone())
                .collect()
        };

        if affected.is_empty() {
            return Ok(0);
        }

        for fingerprint in &affected {
            self.cache
                .invalidate(keys::QUERY_NS, Some(&format!("{fingerprint}*")))
                .await?;
        }

        // Content cache entries are keyed by content id only, so the whole
        // namespace goes when any query for this source is dropped
        self.cache.invalidate(keys::CONTENT_NS, None).await?;

        let dropped = affected.len() as u64;
        let mut usage = self.usage.lock().unwrap();
        for fingerprint in &affected {
            usage.remove(fingerprint);
        }

        tracing::info!(source_id, dropped, "invalidated warm queries for source");
        Ok(dropped)
    }

    /// Prune stats and patterns idle past the configured age
    pub fn cleanup(&self) {
        let max_age_secs = self.config.read().unwrap().max_age_secs as i64;
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age_secs);

        let mut usage = self.usage.lock().unwrap();
        usage.retain(|_, stat| stat.last_accessed >= cutoff);
        drop(usage);

        let mut patterns = self.patterns.lock().unwrap();
        patterns.retain(|_, stat| stat.last_used >= cutoff);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the interval loop when warming is enabled
    pub fn start(self: Arc<Self>) {
        let config = self.config.read().unwrap().clone();
        if !config.enabled {
            return;
        }

        let token = CancellationToken::new();
        {
            let mut slot = self.loop_token.lock().unwrap();
            if let Some(previous) = slot.take() {
                previous.cancel();
            }
            *slot = Some(token.clone());
        }

        Self::spawn_tick_loop(self, config, token);
    }

    fn spawn_tick_loop(warmer: Arc<Self>, config: WarmerConfig, token: CancellationToken) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(
                config.interval_secs.max(1),
            ));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of a tokio interval fires immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => warmer.tick().await,
                }
            }
            tracing::debug!("warming loop stopped");
        });
    }

    /// Stop the interval loop
    pub fn stop(&self) {
        if let Some(token) = self.loop_token.lock().unwrap().take() {
            token.cancel();
        }
    }

    /// Apply hot-updatable knobs, restarting the loop when needed
    pub fn update_config(self: Arc<Self>, patch: &ConfigPatch) {
        let mut restart = false;
        {
            let mut config = self.config.write().unwrap();
            if let Some(enabled) = patch.warming_enabled {
                if config.enabled != enabled {
                    config.enabled = enabled;
                    restart = true;
                }
            }
            if let Some(interval) = patch.warming_interval_secs {
                if config.interval_secs != interval {
                    config.interval_secs = interval;
                    restart = true;
                }
            }
        }

        if restart {
            self.stop();
            self.clone().start();
        }
    }

    /// Consume usage events from the processor
    pub fn spawn_usage_consumer(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<UsageEvent>,
    ) -> CancellationToken {
        let token = CancellationToken::new();
        let warmer = self;
        let loop_token = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => warmer.track(&event),
                        None => break,
                    },
                }
            }
            tracing::debug!("usage consumer stopped");
        });

        token
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Whether a warming pass is currently running
    pub fn is_warming(&self) -> bool {
        self.is_warming.load(Ordering::SeqCst)
    }

    /// Snapshot of the tracked usage stats
    pub fn usage_snapshot(&self) -> Vec<UsageStat> {
        self.usage.lock().unwrap().values().cloned().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sift_cache::MemoryBackend;
    use sift_core::config::CacheConfig;
    use sift_core::SiftError;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    /// Pipeline stub that records materialize calls and caches a result
    struct CountingPipeline {
        cache: Arc<CacheStore>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WarmQueryPipeline for CountingPipeline {
        async fn materialize(&self, query_text: &str) -> Result<QueryResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = QueryResult {
                id: Uuid::new_v4(),
                response: format!("answer for {query_text}"),
                sources: Vec::new(),
                confidence: 0.8,
                processing_time_ms: 5,
                cached: false,
            };
            let fingerprint = sift_core::query_fingerprint(query_text, None, None);
            self.cache
                .set_query_result(&fingerprint, &result, None)
                .await
                .map_err(|e| SiftError::Cache(e.to_string()))?;
            Ok(result)
        }
    }

    fn setup(config: WarmerConfig) -> (Arc<CacheWarmer>, Arc<CacheStore>, Arc<CountingPipeline>) {
        let cache = Arc::new(CacheStore::new(
            Arc::new(MemoryBackend::new(16 * 1024 * 1024)),
            CacheConfig::default(),
        ));
        let pipeline = Arc::new(CountingPipeline {
            cache: cache.clone(),
            calls: AtomicUsize::new(0),
        });
        let warmer = Arc::new(CacheWarmer::new(cache.clone(), pipeline.clone(), config));
        (warmer, cache, pipeline)
    }

    fn event(text: &str, sources: Vec<&str>) -> UsageEvent {
        UsageEvent {
            fingerprint: sift_core::query_fingerprint(text, None, None),
            query_text: text.to_string(),
            processing_time_ms: 40,
            sources: sources.into_iter().map(str::to_string).collect(),
        }
    }

    #[tokio::test]
    async fn test_track_creates_and_updates() {
        let (warmer, _cache, _pipeline) = setup(WarmerConfig::default());

        warmer.track(&event("rust async", vec!["s1"]));
        warmer.track(&event("rust async", vec!["s2"]));

        let stats = warmer.usage_snapshot();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].avg_processing_ms, 40.0);
        assert!(stats[0].sources.contains(&"s1".to_string()));
        assert!(stats[0].sources.contains(&"s2".to_string()));
    }

    #[tokio::test]
    async fn test_rolling_average_moves_toward_recent() {
        let (warmer, _cache, _pipeline) = setup(WarmerConfig::default());

        let mut first = event("q", vec![]);
        first.processing_time_ms = 100;
        warmer.track(&first);

        let mut second = event("q", vec![]);
        second.processing_time_ms = 20;
        warmer.track(&second);

        let stats = warmer.usage_snapshot();
        assert_eq!(stats[0].avg_processing_ms, 60.0);
    }

    #[tokio::test]
    async fn test_pattern_priority_decays_with_idle_gap() {
        let config = WarmerConfig {
            max_age_secs: 7200,
            ..Default::default()
        };
        let (rapid, _cache, _pipeline) = setup(config.clone());
        let (idle, _cache, _pipeline) = setup(config);

        let e = event("decay query", vec![]);
        let t0 = Utc::now();

        // Same pattern reused back-to-back keeps full recency
        rapid.track_at(&e, t0);
        rapid.track_at(&e, t0);
        let rapid_priority = rapid
            .patterns
            .lock()
            .unwrap()
            .values()
            .next()
            .unwrap()
            .priority;

        // Reused after an hour idle, recency halves against the 2h max age
        idle.track_at(&e, t0);
        idle.track_at(&e, t0 + chrono::Duration::hours(1));
        let idle_priority = idle
            .patterns
            .lock()
            .unwrap()
            .values()
            .next()
            .unwrap()
            .priority;

        assert!(idle_priority < rapid_priority);
        assert!((rapid_priority - (0.6 + 0.4 * 0.02)).abs() < 1e-6);
        assert!((idle_priority - (0.6 * 0.5 + 0.4 * 0.02)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_popular_respects_threshold() {
        let config = WarmerConfig {
            popularity_threshold: 3,
            ..Default::default()
        };
        let (warmer, _cache, _pipeline) = setup(config);

        warmer.track(&event("rare", vec![]));
        for _ in 0..3 {
            warmer.track(&event("hot", vec![]));
        }

        let popular = warmer.popular(10);
        assert_eq!(popular.len(), 1);
        assert_eq!(popular[0], sift_core::query_fingerprint("hot", None, None));
    }

    #[tokio::test]
    async fn test_preload_materializes_uncached() {
        let config = WarmerConfig {
            popularity_threshold: 1,
            ..Default::default()
        };
        let (warmer, cache, pipeline) = setup(config);

        warmer.track(&event("warm me", vec![]));
        warmer.preload_hot().await;

        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);
        let fingerprint = sift_core::query_fingerprint("warm me", None, None);
        assert!(cache.has_query_result(&fingerprint).await);

        // A second pass skips the already-cached fingerprint
        warmer.preload_hot().await;
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_for_source() {
        let config = WarmerConfig {
            popularity_threshold: 1,
            ..Default::default()
        };
        let (warmer, cache, _pipeline) = setup(config);

        warmer.track(&event("query one", vec!["s1"]));
        warmer.track(&event("query two", vec!["s2"]));
        warmer.preload_hot().await;

        let dropped = warmer.invalidate_for_source("s1").await.unwrap();
        assert_eq!(dropped, 1);

        let fp_one = sift_core::query_fingerprint("query one", None, None);
        let fp_two = sift_core::query_fingerprint("query two", None, None);
        assert!(!cache.has_query_result(&fp_one).await);
        assert!(cache.has_query_result(&fp_two).await);
        assert_eq!(warmer.usage_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_prunes_stale() {
        let config = WarmerConfig {
            max_age_secs: 0,
            ..Default::default()
        };
        let (warmer, _cache, _pipeline) = setup(config);

        warmer.track(&event("old", vec![]));
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        warmer.cleanup();
        assert!(warmer.usage_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_is_warming_guard() {
        let (warmer, _cache, _pipeline) = setup(WarmerConfig::default());
        assert!(!warmer.is_warming());
        warmer.is_warming.store(true, Ordering::SeqCst);

        // Tick bails immediately without touching anything
        warmer.tick().await;
        assert!(warmer.is_warming());
    }

    #[tokio::test]
    async fn test_update_config_toggles_loop() {
        let (warmer, _cache, _pipeline) = setup(WarmerConfig {
            enabled: false,
            ..Default::default()
        });
        warmer.clone().start();
        assert!(warmer.loop_token.lock().unwrap().is_none());

        let patch = ConfigPatch {
            warming_enabled: Some(true),
            ..Default::default()
        };
        warmer.clone().update_config(&patch);
        assert!(warmer.loop_token.lock().unwrap().is_some());

        let patch = ConfigPatch {
            warming_enabled: Some(false),
            ..Default::default()
        };
        warmer.clone().update_config(&patch);
        warmer.stop();
        assert!(warmer.loop_token.lock().unwrap().is_none());
    }
}
