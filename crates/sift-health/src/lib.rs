//! Sift Health - Health probes and performance monitoring
//!
//! Two cooperating pieces:
//! - `PerformanceMonitor`: rolling per-query records, periodic system
//!   snapshots, percentiles, trend halves, and edge-triggered alerts
//! - `HealthService`: per-component probes (api, cache, data sources,
//!   embedding, vector search, monitoring) rolled up into a system status
//!
//! Both run read-only against the rest of the system and own their
//! background ticks.

pub mod memory;
pub mod monitor;
pub mod service;

pub use memory::MemoryUsage;
pub use monitor::{
    Alert, AlertSeverity, ConnectionMetrics, PerformanceMetrics, PerformanceMonitor,
    QueryRecord, SystemSnapshot, TrendsSnapshot,
};
pub use service::{ComponentHealth, HealthService, SystemHealth};
