//! Static data-source registry
//!
//! Config-seeded registry stand-in for the external metadata store. Sources
//! are registered at startup; probe outcomes can be recorded by the hosting
//! layer (and by tests) and are served back with per-source error counts.

use async_trait::async_trait;
use sift_core::{DataSource, DataSourceRegistry, Result, SourceHealth};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-process registry over a fixed source list
pub struct StaticSourceRegistry {
    sources: RwLock<Vec<DataSource>>,
    health: RwLock<HashMap<String, SourceHealth>>,
}

impl StaticSourceRegistry {
    pub fn new(sources: Vec<DataSource>) -> Self {
        Self {
            sources: RwLock::new(sources),
            health: RwLock::new(HashMap::new()),
        }
    }

    /// Register an additional source
    pub fn add_source(&self, source: DataSource) {
        self.sources.write().unwrap().push(source);
    }

    /// Remove a source; returns true when it existed
    pub fn remove_source(&self, source_id: &str) -> bool {
        let mut sources = self.sources.write().unwrap();
        let before = sources.len();
        sources.retain(|s| s.id != source_id);
        self.health.write().unwrap().remove(source_id);
        sources.len() != before
    }

    /// Record a probe outcome for a source
    pub fn set_health(&self, source_id: &str, health: SourceHealth) {
        self.health
            .write()
            .unwrap()
            .insert(source_id.to_string(), health);
    }

    /// Record a failure, bumping the source's error count
    pub fn record_failure(&self, source_id: &str, error: impl Into<String>) {
        let mut health = self.health.write().unwrap();
        let entry = health
            .entry(source_id.to_string())
            .or_insert_with(|| SourceHealth::unhealthy("", 0));
        entry.is_healthy = false;
        entry.last_error = Some(error.into());
        entry.error_count += 1;
    }
}

#[async_trait]
impl DataSourceRegistry for StaticSourceRegistry {
    async fn list_active(&self) -> Result<Vec<DataSource>> {
        Ok(self.sources.read().unwrap().clone())
    }

    async fn probe(&self, source_id: &str) -> Result<SourceHealth> {
        let health = self.health.read().unwrap();
        Ok(health
            .get(source_id)
            .cloned()
            .unwrap_or_else(|| SourceHealth::healthy(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_and_probe_defaults() {
        let registry = StaticSourceRegistry::new(vec![DataSource::new("s1", "One", "file")]);

        let sources = registry.list_active().await.unwrap();
        assert_eq!(sources.len(), 1);

        let health = registry.probe("s1").await.unwrap();
        assert!(health.is_healthy);
    }

    #[tokio::test]
    async fn test_recorded_failures_served() {
        let registry = StaticSourceRegistry::new(vec![DataSource::new("s1", "One", "file")]);
        registry.record_failure("s1", "connection refused");
        registry.record_failure("s1", "connection refused again");

        let health = registry.probe("s1").await.unwrap();
        assert!(!health.is_healthy);
        assert_eq!(health.error_count, 2);
        assert_eq!(
            health.last_error.as_deref(),
            Some("connection refused again")
        );
    }

    #[tokio::test]
    async fn test_add_remove_source() {
        let registry = StaticSourceRegistry::new(Vec::new());
        registry.add_source(DataSource::new("s1", "One", "api"));
        assert_eq!(registry.list_active().await.unwrap().len(), 1);

        assert!(registry.remove_source("s1"));
        assert!(!registry.remove_source("s1"));
        assert!(registry.list_active().await.unwrap().is_empty());
    }
}
