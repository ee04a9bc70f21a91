//! Health service
//!
//! Probes each component on demand or on a schedule and rolls the results
//! into a system status. The service reads its collaborators through the
//! same capability traits the pipeline uses; it never mutates them.

use crate::memory;
use crate::monitor::PerformanceMonitor;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sift_cache::CacheStore;
use sift_core::{
    DataSourceRegistry, EmbeddingProvider, HealthStatus, SearchParams, VectorStore,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Canned text embedded by the embedding-service probe
const PROBE_TEXT: &str = "health probe";

/// Health report for one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub details: HashMap<String, serde_json::Value>,
    pub error: Option<String>,
}

impl ComponentHealth {
    fn healthy(name: &str, elapsed_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Healthy,
            response_time_ms: elapsed_ms,
            details: HashMap::new(),
            error: None,
        }
    }

    fn with_status(mut self, status: HealthStatus) -> Self {
        self.status = status;
        self
    }

    fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.status = HealthStatus::Unhealthy;
        self.error = Some(error.into());
        self
    }
}

/// Rolled-up system health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub checked_at: DateTime<Utc>,
}

/// Probes components and publishes system health
pub struct HealthService {
    cache: Arc<CacheStore>,
    registry: Arc<dyn DataSourceRegistry>,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    monitor: Arc<PerformanceMonitor>,
    last: Mutex<Option<SystemHealth>>,
}

impl HealthService {
    pub fn new(
        cache: Arc<CacheStore>,
        registry: Arc<dyn DataSourceRegistry>,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            cache,
            registry,
            embedder,
            vectors,
            monitor,
            last: Mutex::new(None),
        }
    }

    /// Probe every component and publish a fresh snapshot
    pub async fn check(&self) -> SystemHealth {
        let (api, cache, sources, embedding, vector, monitoring) = tokio::join!(
            self.probe_api(),
            self.probe_cache(),
            self.probe_data_sources(),
            self.probe_embedding(),
            self.probe_vector_search(),
            self.probe_monitoring(),
        );

        let components = vec![api, cache, sources, embedding, vector, monitoring];
        let status = Self::rollup(&components);

        let health = SystemHealth {
            status,
            components,
            checked_at: Utc::now(),
        };

        *self.last.lock().unwrap() = Some(health.clone());
        health
    }

    /// Most recent snapshot, when a check has run
    pub fn last(&self) -> Option<SystemHealth> {
        self.last.lock().unwrap().clone()
    }

    /// System rollup: api or cache unhealthy sinks the system; any other
    /// unhealthy or degraded component degrades it
    fn rollup(components: &[ComponentHealth]) -> HealthStatus {
        let critical_down = components
            .iter()
            .filter(|c| c.name == "api" || c.name == "cache")
            .any(|c| c.status == HealthStatus::Unhealthy);
        if critical_down {
            return HealthStatus::Unhealthy;
        }

        if components
            .iter()
            .any(|c| c.status != HealthStatus::Healthy)
        {
            return HealthStatus::Degraded;
        }

        HealthStatus::Healthy
    }

    // ------------------------------------------------------------------
    // Probes
    // ------------------------------------------------------------------

    async fn probe_api(&self) -> ComponentHealth {
        let start = Instant::now();
        let thresholds = self.monitor.thresholds();

        let mut health = ComponentHealth::healthy("api", elapsed_ms(start));
        if let Some(usage) = memory::sample() {
            let ratio = usage.ratio();
            health = health
                .with_detail("memory_used_bytes", usage.used_bytes)
                .with_detail("memory_total_bytes", usage.total_bytes)
                .with_detail("memory_ratio", ratio);
            if ratio > thresholds.memory_usage {
                health = health.with_status(HealthStatus::Degraded);
            }
        }
        health.response_time_ms = elapsed_ms(start);
        health
    }

    async fn probe_cache(&self) -> ComponentHealth {
        let start = Instant::now();
        let thresholds = self.monitor.thresholds();

        match self.cache.ping().await {
            Ok(()) => {
                let stats = self.cache.stats().await;
                let mut health = ComponentHealth::healthy("cache", elapsed_ms(start))
                    .with_detail("hit_rate", stats.hit_rate)
                    .with_detail("total_keys", stats.total_keys)
                    .with_detail("memory_usage_bytes", stats.memory_usage_bytes);
                let observed = stats.hits + stats.misses;
                if observed > 0 && stats.hit_rate < thresholds.cache_hit_rate {
                    health = health.with_status(HealthStatus::Degraded);
                }
                health.response_time_ms = elapsed_ms(start);
                health
            }
            Err(e) => ComponentHealth::healthy("cache", elapsed_ms(start)).with_error(e.to_string()),
        }
    }

    async fn probe_data_sources(&self) -> ComponentHealth {
        let start = Instant::now();
        let thresholds = self.monitor.thresholds();

        let sources = match self.registry.list_active().await {
            Ok(sources) => sources,
            Err(e) => {
                return ComponentHealth::healthy("data_sources", elapsed_ms(start))
                    .with_error(format!("registry listing failed: {e}"));
            }
        };

        if sources.is_empty() {
            return ComponentHealth::healthy("data_sources", elapsed_ms(start))
                .with_status(HealthStatus::Degraded)
                .with_detail("sources", 0);
        }

        let probes = join_all(
            sources
                .iter()
                .map(|source| self.registry.probe(&source.id)),
        )
        .await;

        let total = sources.len();
        let mut unhealthy = 0usize;
        for (source, outcome) in sources.iter().zip(probes) {
            let healthy = outcome.map(|h| h.is_healthy).unwrap_or(false);
            self.monitor.record_source_probe(&source.id, healthy);
            if !healthy {
                unhealthy += 1;
            }
        }

        let status = if unhealthy == 0 {
            HealthStatus::Healthy
        } else if unhealthy == total
            || unhealthy as f64 / total as f64 >= thresholds.data_source_failure_percentage
        {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };

        ComponentHealth::healthy("data_sources", elapsed_ms(start))
            .with_status(status)
            .with_detail("sources", total)
            .with_detail("unhealthy", unhealthy)
    }

    async fn probe_embedding(&self) -> ComponentHealth {
        let start = Instant::now();
        match self.embedder.embed(PROBE_TEXT).await {
            Ok(embedding) if !embedding.vector.is_empty() => {
                ComponentHealth::healthy("embedding_service", elapsed_ms(start))
                    .with_detail("dimension", embedding.vector.len())
                    .with_detail("model", embedding.model)
            }
            Ok(_) => ComponentHealth::healthy("embedding_service", elapsed_ms(start))
                .with_error("provider returned an empty vector"),
            Err(e) => ComponentHealth::healthy("embedding_service", elapsed_ms(start))
                .with_error(e.to_string()),
        }
    }

    async fn probe_vector_search(&self) -> ComponentHealth {
        let start = Instant::now();
        let dimension = self
            .vectors
            .stats()
            .await
            .map(|s| s.dimension)
            .unwrap_or(8)
            .max(1);

        let probe = vec![0.0f32; dimension];
        match self.vectors.search(&probe, &SearchParams::top_k(1)).await {
            Ok(hits) => ComponentHealth::healthy("vector_search", elapsed_ms(start))
                .with_detail("returned", hits.len()),
            Err(e) => ComponentHealth::healthy("vector_search", elapsed_ms(start))
                .with_error(e.to_string()),
        }
    }

    async fn probe_monitoring(&self) -> ComponentHealth {
        let start = Instant::now();
        let metrics = self.monitor.performance();
        ComponentHealth::healthy("monitoring", elapsed_ms(start))
            .with_detail("total_queries", metrics.total_queries)
            .with_detail("error_rate", metrics.error_rate)
    }

    // ------------------------------------------------------------------
    // Background loop
    // ------------------------------------------------------------------

    /// Spawn the periodic health tick; cancel via the returned token
    pub fn spawn_background(self: Arc<Self>) -> CancellationToken {
        let token = CancellationToken::new();
        let service = self;
        let loop_token = token.clone();

        tokio::spawn(async move {
            let interval_secs = service.monitor.thresholds().check_interval_secs.max(1);
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = interval.tick() => {
                        let health = service.check().await;
                        tracing::debug!(status = %health.status, "health tick");
                    }
                }
            }
            tracing::debug!("health background loop stopped");
        });

        token
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

// ============================================================================
// Tests
// ============================================================================
