//! Application state shared across handlers

use sift_cache::CacheStore;
use sift_core::config::AppConfig;
use sift_health::{HealthService, PerformanceMonitor};
use sift_index::Indexer;
use sift_query::{CacheWarmer, QueryProcessor};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Everything handlers need, assembled once at startup
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Server start time
    pub start_time: Instant,

    /// Request counter
    pub request_count: AtomicU64,

    /// Query pipeline
    pub processor: Arc<QueryProcessor>,

    /// Cache warmer
    pub warmer: Arc<CacheWarmer>,

    /// Indexing pipeline
    pub indexer: Arc<Indexer>,

    /// Health probes
    pub health: Arc<HealthService>,

    /// Performance monitor
    pub monitor: Arc<PerformanceMonitor>,

    /// Typed cache store
    pub cache: Arc<CacheStore>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AppConfig,
        processor: Arc<QueryProcessor>,
        warmer: Arc<CacheWarmer>,
        indexer: Arc<Indexer>,
        health: Arc<HealthService>,
        monitor: Arc<PerformanceMonitor>,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            processor,
            warmer,
            indexer,
            health,
            monitor,
            cache,
        }
    }

    /// Increment and return the request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Total requests served
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Seconds since startup
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
