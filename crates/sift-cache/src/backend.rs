//! In-memory cache backend
//!
//! Implements the key-value backend contract in-process using moka. Entries
//! carry their own TTL, the cache is weighed by entry bytes against the
//! configured memory ceiling, and size-based evictions are counted for the
//! stats report.

use async_trait::async_trait;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::Expiry;
use sift_core::{BackendInfo, CacheBackend, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A stored value with its own TTL
#[derive(Debug, Clone)]
struct StoredValue {
    data: String,
    ttl: Duration,
}

/// Per-entry expiration read from the stored value
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Overwrites restart the clock with the new TTL
        Some(value.ttl)
    }
}

/// Thread-safe in-process backend with LRU-style size eviction
#[derive(Clone)]
pub struct MemoryBackend {
    cache: Cache<String, StoredValue>,
    max_memory_bytes: u64,
    evictions: Arc<AtomicU64>,
}

impl MemoryBackend {
    /// Create a backend bounded by `max_memory_bytes`
    pub fn new(max_memory_bytes: u64) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let listener_evictions = Arc::clone(&evictions);

        let cache = Cache::builder()
            .max_capacity(max_memory_bytes)
            .weigher(|key: &String, value: &StoredValue| {
                (key.len() + value.data.len()) as u32
            })
            .expire_after(PerEntryTtl)
            .eviction_listener(move |_key, _value, cause| {
                if cause == RemovalCause::Size {
                    listener_evictions.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();

        Self {
            cache,
            max_memory_bytes,
            evictions,
        }
    }

    /// Match a key against a glob pattern (`*` wildcard only)
    fn pattern_matches(pattern: &str, key: &str) -> bool {
        if !pattern.contains('*') {
            return pattern == key;
        }

        let parts: Vec<&str> = pattern.split('*').collect();
        let mut remainder = key;

        // Anchored prefix
        if let Some(first) = parts.first() {
            if !first.is_empty() {
                match remainder.strip_prefix(first) {
                    Some(rest) => remainder = rest,
                    None => return false,
                }
            }
        }

        // Anchored suffix
        let last = parts.last().copied().unwrap_or("");
        let middle = &parts[1..parts.len().saturating_sub(1)];

        for part in middle {
            if part.is_empty() {
                continue;
            }
            match remainder.find(part) {
                Some(idx) => remainder = &remainder[idx + part.len()..],
                None => return false,
            }
        }

        if last.is_empty() {
            true
        } else {
            remainder.ends_with(last)
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.get(key).await.map(|v| v.data))
    }

    async fn set_ex(&self, key: &str, ttl_secs: u64, value: String) -> Result<()> {
        let stored = StoredValue {
            data: value,
            ttl: Duration::from_secs(ttl_secs.max(1)),
        };
        self.cache.insert(key.to_string(), stored).await;
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.cache.get(key).await.map(|v| v.data));
        }
        Ok(out)
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        let mut deleted = 0;
        for key in keys {
            if self.cache.contains_key(key) {
                deleted += 1;
            }
            self.cache.invalidate(key).await;
        }
        Ok(deleted)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.cache.run_pending_tasks().await;
        let matched = self
            .cache
            .iter()
            .filter(|(key, _)| Self::pattern_matches(pattern, key))
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        Ok(matched)
    }

    async fn dbsize(&self) -> Result<u64> {
        self.cache.run_pending_tasks().await;
        Ok(self.cache.entry_count())
    }

    async fn info(&self) -> Result<BackendInfo> {
        self.cache.run_pending_tasks().await;
        Ok(BackendInfo {
            used_memory_bytes: self.cache.weighted_size(),
            max_memory_bytes: Some(self.max_memory_bytes),
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn set_many(&self, entries: Vec<(String, u64, String)>) -> Result<()> {
        for (key, ttl_secs, value) in entries {
            self.set_ex(&key, ttl_secs, value).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let backend = MemoryBackend::new(1024 * 1024);
        backend
            .set_ex("query:abc", 60, "payload".to_string())
            .await
            .unwrap();
        assert_eq!(
            backend.get("query:abc").await.unwrap(),
            Some("payload".to_string())
        );
        assert_eq!(backend.get("query:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let backend = MemoryBackend::new(1024 * 1024);
        backend
            .set_ex("short", 1, "gone soon".to_string())
            .await
            .unwrap();
        assert!(backend.get("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(backend.get("short").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_del_counts_existing() {
        let backend = MemoryBackend::new(1024 * 1024);
        backend.set_ex("a", 60, "1".to_string()).await.unwrap();
        backend.set_ex("b", 60, "2".to_string()).await.unwrap();

        let deleted = backend
            .del(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(backend.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_pattern() {
        let backend = MemoryBackend::new(1024 * 1024);
        backend
            .set_ex("query:one", 60, "1".to_string())
            .await
            .unwrap();
        backend
            .set_ex("query:two", 60, "2".to_string())
            .await
            .unwrap();
        backend
            .set_ex("embedding:one", 60, "3".to_string())
            .await
            .unwrap();

        let mut keys = backend.keys("query:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["query:one", "query:two"]);

        let keys = backend.keys("*one*").await.unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn test_mget_preserves_order() {
        let backend = MemoryBackend::new(1024 * 1024);
        backend.set_ex("k1", 60, "v1".to_string()).await.unwrap();
        backend.set_ex("k3", 60, "v3".to_string()).await.unwrap();

        let values = backend
            .mget(&["k1".to_string(), "k2".to_string(), "k3".to_string()])
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![Some("v1".to_string()), None, Some("v3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_dbsize_and_info() {
        let backend = MemoryBackend::new(1024 * 1024);
        backend.set_ex("k1", 60, "v1".to_string()).await.unwrap();
        backend.set_ex("k2", 60, "v2".to_string()).await.unwrap();

        assert_eq!(backend.dbsize().await.unwrap(), 2);
        let info = backend.info().await.unwrap();
        assert!(info.used_memory_bytes > 0);
        assert_eq!(info.max_memory_bytes, Some(1024 * 1024));
    }

    #[test]
    fn test_pattern_matching() {
        assert!(MemoryBackend::pattern_matches("query:*", "query:abc"));
        assert!(MemoryBackend::pattern_matches("*abc*", "query:abc:meta"));
        assert!(MemoryBackend::pattern_matches("query:abc", "query:abc"));
        assert!(MemoryBackend::pattern_matches("*", "anything"));
        assert!(MemoryBackend::pattern_matches("a*c", "abc"));
        assert!(!MemoryBackend::pattern_matches("query:*", "embedding:abc"));
        assert!(!MemoryBackend::pattern_matches("a*c", "abd"));
    }
}
