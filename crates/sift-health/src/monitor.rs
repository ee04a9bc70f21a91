//! Performance monitoring
//!
//! Keeps a rolling window of per-query records and periodic system
//! snapshots, computes percentiles and trend halves, and raises alerts on
//! threshold-crossing edges. All mutation goes through this component's own
//! locks; no lock is held across an await.

use crate::memory;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sift_core::config::HealthThresholds;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Alerts retained in memory
const ALERT_CAPACITY: usize = 100;

/// Consecutive failures at which severity escalates to critical
const CRITICAL_CONSECUTIVE_FAILURES: u64 = 5;

// ============================================================================
// Records and reports
// ============================================================================

/// One completed query, as recorded by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: u64,
    pub success: bool,
    pub cached: bool,
    pub source_count: usize,
    pub confidence: f32,
    pub user_id: Option<String>,
    pub error_code: Option<String>,
}

/// Aggregated performance over the retained window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    pub cached_queries: u64,
    pub avg_response_ms: f64,
    pub p50_response_ms: u64,
    pub p90_response_ms: u64,
    pub p95_response_ms: u64,
    pub p99_response_ms: u64,
    pub max_response_ms: u64,
    pub error_rate: f64,
    pub cache_hit_rate: f64,
}

/// Periodic system sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_queries: u64,
    pub error_rate: f64,
    pub avg_response_ms: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
}

/// Comparison of the older and newer halves of the retained window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendsSnapshot {
    pub degrading_response_time: bool,
    pub increasing_error_rate: bool,
    pub older_avg_response_ms: f64,
    pub newer_avg_response_ms: f64,
    pub older_error_rate: f64,
    pub newer_error_rate: f64,
}

/// Alert severity grades
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A raised alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub severity: AlertSeverity,
    pub component: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-source connection bookkeeping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub last_success: Option<DateTime<Utc>>,
    pub attempts: u64,
    pub consecutive_failures: u64,
}

// ============================================================================
// Monitor
// ============================================================================

/// Rolling metrics collector
pub struct PerformanceMonitor {
    thresholds: RwLock<HealthThresholds>,
    records: Mutex<VecDeque<QueryRecord>>,
    snapshots: Mutex<VecDeque<SystemSnapshot>>,
    sources: Mutex<HashMap<String, ConnectionMetrics>>,
    alerts: Mutex<VecDeque<Alert>>,
    slow_alerted: AtomicBool,
    error_rate_alerted: AtomicBool,
}

impl PerformanceMonitor {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds: RwLock::new(thresholds),
            records: Mutex::new(VecDeque::new()),
            snapshots: Mutex::new(VecDeque::new()),
            sources: Mutex::new(HashMap::new()),
            alerts: Mutex::new(VecDeque::new()),
            slow_alerted: AtomicBool::new(false),
            error_rate_alerted: AtomicBool::new(false),
        }
    }

    /// Current thresholds
    pub fn thresholds(&self) -> HealthThresholds {
        self.thresholds.read().unwrap().clone()
    }

    /// Replace thresholds (hot update)
    pub fn set_thresholds(&self, thresholds: HealthThresholds) {
        *self.thresholds.write().unwrap() = thresholds;
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Record a completed query and evaluate rolling alerts
    pub fn record_query(&self, record: QueryRecord) {
        let thresholds = self.thresholds();
        {
            let mut records = self.records.lock().unwrap();
            records.push_back(record);
            Self::prune_records(&mut records, thresholds.retention_hours);
        }

        let metrics = self.performance();

        // Slow-response alert, once per crossing
        if metrics.avg_response_ms > thresholds.response_time_ms as f64 {
            if !self.slow_alerted.swap(true, Ordering::SeqCst) {
                self.raise(
                    AlertSeverity::Medium,
                    "api",
                    format!(
                        "average response time {:.0}ms exceeds {}ms",
                        metrics.avg_response_ms, thresholds.response_time_ms
                    ),
                );
            }
        } else {
            self.slow_alerted.store(false, Ordering::SeqCst);
        }

        // Error-rate alert, critical above twice the threshold
        if metrics.error_rate > thresholds.error_rate {
            if !self.error_rate_alerted.swap(true, Ordering::SeqCst) {
                let severity = if metrics.error_rate > thresholds.error_rate * 2.0 {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::High
                };
                self.raise(
                    severity,
                    "api",
                    format!(
                        "error rate {:.1}% exceeds {:.1}%",
                        metrics.error_rate * 100.0,
                        thresholds.error_rate * 100.0
                    ),
                );
            }
        } else {
            self.error_rate_alerted.store(false, Ordering::SeqCst);
        }
    }

    /// Record a data-source probe outcome
    ///
    /// Consecutive-failure alerts fire once when the threshold is crossed
    /// and re-arm on the first success.
    pub fn record_source_probe(&self, source_id: &str, healthy: bool) {
        let thresholds = self.thresholds();
        let failure_threshold = thresholds.consecutive_failures.max(1);

        let consecutive = {
            let mut sources = self.sources.lock().unwrap();
            let entry = sources.entry(source_id.to_string()).or_default();
            entry.attempts += 1;
            if healthy {
                entry.last_success = Some(Utc::now());
                entry.consecutive_failures = 0;
                return;
            }
            entry.consecutive_failures += 1;
            entry.consecutive_failures
        };

        if consecutive == failure_threshold {
            let severity = if consecutive >= CRITICAL_CONSECUTIVE_FAILURES {
                AlertSeverity::Critical
            } else {
                AlertSeverity::High
            };
            self.raise(
                severity,
                "data_sources",
                format!("source {source_id} failed {consecutive} consecutive probes"),
            );
        } else if consecutive == CRITICAL_CONSECUTIVE_FAILURES
            && failure_threshold < CRITICAL_CONSECUTIVE_FAILURES
        {
            self.raise(
                AlertSeverity::Critical,
                "data_sources",
                format!("source {source_id} failed {consecutive} consecutive probes"),
            );
        }
    }

    /// Take a system snapshot (called on the snapshot tick)
    pub fn take_snapshot(&self) {
        let metrics = self.performance();
        let memory = memory::sample();
        let snapshot = SystemSnapshot {
            timestamp: Utc::now(),
            total_queries: metrics.total_queries,
            error_rate: metrics.error_rate,
            avg_response_ms: metrics.avg_response_ms,
            memory_used_bytes: memory.map(|m| m.used_bytes).unwrap_or(0),
            memory_total_bytes: memory.map(|m| m.total_bytes).unwrap_or(0),
        };

        let retention_hours = self.thresholds().retention_hours;
        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots.push_back(snapshot);
        let cutoff = Utc::now() - Duration::hours(retention_hours as i64);
        while snapshots
            .front()
            .map(|s| s.timestamp < cutoff)
            .unwrap_or(false)
        {
            snapshots.pop_front();
        }
    }

    /// Drop records older than the retention window
    pub fn cleanup(&self) {
        let retention_hours = self.thresholds().retention_hours;
        let mut records = self.records.lock().unwrap();
        Self::prune_records(&mut records, retention_hours);
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    /// Aggregate metrics over the retained window
    pub fn performance(&self) -> PerformanceMetrics {
        let records = self.records.lock().unwrap();
        if records.is_empty() {
            return PerformanceMetrics::default();
        }

        let total = records.len() as u64;
        let successful = records.iter().filter(|r| r.success).count() as u64;
        let cached = records.iter().filter(|r| r.cached).count() as u64;

        let mut times: Vec<u64> = records.iter().map(|r| r.response_time_ms).collect();
        times.sort_unstable();

        let sum: u64 = times.iter().sum();
        let avg = sum as f64 / total as f64;

        PerformanceMetrics {
            total_queries: total,
            successful_queries: successful,
            failed_queries: total - successful,
            cached_queries: cached,
            avg_response_ms: avg,
            p50_response_ms: percentile(&times, 0.50),
            p90_response_ms: percentile(&times, 0.90),
            p95_response_ms: percentile(&times, 0.95),
            p99_response_ms: percentile(&times, 0.99),
            max_response_ms: *times.last().unwrap_or(&0),
            error_rate: (total - successful) as f64 / total as f64,
            cache_hit_rate: cached as f64 / total as f64,
        }
    }

    /// Compare the older and newer halves of the retained window
    pub fn trends(&self) -> TrendsSnapshot {
        let retention_hours = self.thresholds().retention_hours;
        let midpoint = Utc::now() - Duration::hours(retention_hours as i64 / 2);

        let records = self.records.lock().unwrap();
        let (older, newer): (Vec<&QueryRecord>, Vec<&QueryRecord>) =
            records.iter().partition(|r| r.timestamp < midpoint);

        let older_avg = avg_response(&older);
        let newer_avg = avg_response(&newer);
        let older_err = error_rate(&older);
        let newer_err = error_rate(&newer);

        let degrading = !older.is_empty() && !newer.is_empty() && newer_avg >= older_avg * 1.2;
        let increasing = if older.is_empty() || newer.is_empty() {
            false
        } else if older_err == 0.0 {
            newer_err > 0.0
        } else {
            newer_err >= older_err * 1.5
        };

        TrendsSnapshot {
            degrading_response_time: degrading,
            increasing_error_rate: increasing,
            older_avg_response_ms: older_avg,
            newer_avg_response_ms: newer_avg,
            older_error_rate: older_err,
            newer_error_rate: newer_err,
        }
    }

    /// Recent alerts, newest last
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().iter().cloned().collect()
    }

    /// Retained system snapshots, oldest first
    pub fn snapshots(&self) -> Vec<SystemSnapshot> {
        self.snapshots.lock().unwrap().iter().cloned().collect()
    }

    /// Per-source connection metrics
    pub fn source_metrics(&self) -> HashMap<String, ConnectionMetrics> {
        self.sources.lock().unwrap().clone()
    }

    /// Whether at least one snapshot has been taken
    pub fn has_snapshot(&self) -> bool {
        !self.snapshots.lock().unwrap().is_empty()
    }

    // ------------------------------------------------------------------
    // Background loops
    // ------------------------------------------------------------------

    /// Spawn the snapshot and cleanup ticks; cancel via the returned token
    pub fn spawn_background(self: std::sync::Arc<Self>) -> CancellationToken {
        let token = CancellationToken::new();
        let monitor = self;
        let loop_token = token.clone();

        tokio::spawn(async move {
            let interval_secs = monitor.thresholds().snapshot_interval_secs.max(1);
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = interval.tick() => {
                        monitor.take_snapshot();
                        monitor.cleanup();
                    }
                }
            }
            tracing::debug!("monitor background loop stopped");
        });

        token
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn raise(&self, severity: AlertSeverity, component: &str, message: String) {
        tracing::warn!(component, ?severity, "{message}");
        let mut alerts = self.alerts.lock().unwrap();
        alerts.push_back(Alert {
            id: Uuid::new_v4(),
            severity,
            component: component.to_string(),
            message,
            timestamp: Utc::now(),
        });
        while alerts.len() > ALERT_CAPACITY {
            alerts.pop_front();
        }
    }

    fn prune_records(records: &mut VecDeque<QueryRecord>, retention_hours: u64) {
        let cutoff = Utc::now() - Duration::hours(retention_hours as i64);
        while records
            .front()
            .map(|r| r.timestamp < cutoff)
            .unwrap_or(false)
        {
            records.pop_front();
        }
    }
}

/// Nearest-rank percentile over a sorted sample
fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() as f64) * q).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn avg_response(records: &[&QueryRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.response_time_ms).sum::<u64>() as f64 / records.len() as f64
}

fn error_rate(records: &[&QueryRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().filter(|r| !r.success).count() as f64 / records.len() as f64
}

// ============================================================================
// Tests
// ============================================================================
