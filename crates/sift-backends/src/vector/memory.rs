//! In-process vector store
//!
//! A flat cosine-similarity table suitable for single-node deployments and
//! tests. Scores are cosine similarities clamped into [0, 1]; metadata
//! filters are exact-equality on payload fields.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sift_core::{
    ProviderHealth, Result, ScoredPoint, SearchParams, SiftError, VectorRecord, VectorStore,
    VectorStoreStats,
};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::RwLock;

/// Flat in-memory store with brute-force k-NN
pub struct InMemoryVectorStore {
    records: RwLock<HashMap<String, VectorRecord>>,
    dimension: usize,
    last_updated: Mutex<Option<DateTime<Utc>>>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            dimension,
            last_updated: Mutex::new(None),
        }
    }

    fn matches_filter(
        record: &VectorRecord,
        filter: Option<&HashMap<String, serde_json::Value>>,
    ) -> bool {
        let Some(filter) = filter else {
            return true;
        };
        filter
            .iter()
            .all(|(key, expected)| record.metadata.get(key) == Some(expected))
    }
}

/// Cosine similarity clamped to [0, 1]
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        for record in &records {
            if record.vector.len() != self.dimension {
                return Err(SiftError::Provider(format!(
                    "vector {} has dimension {}, store expects {}",
                    record.id,
                    record.vector.len(),
                    self.dimension
                )));
            }
        }

        let mut table = self.records.write().await;
        for record in records {
            table.insert(record.id.clone(), record);
        }
        *self.last_updated.lock().unwrap() = Some(Utc::now());
        Ok(())
    }

    async fn search(&self, vector: &[f32], params: &SearchParams) -> Result<Vec<ScoredPoint>> {
        let table = self.records.read().await;

        let mut scored: Vec<ScoredPoint> = table
            .values()
            .filter(|record| Self::matches_filter(record, params.filter.as_ref()))
            .map(|record| ScoredPoint {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.vector),
                metadata: if params.include_metadata {
                    record.metadata.clone()
                } else {
                    HashMap::new()
                },
            })
            .filter(|point| params.threshold.map(|t| point.score >= t).unwrap_or(true))
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(params.top_k);
        Ok(scored)
    }

    async fn delete(&self, ids: &[String]) -> Result<u64> {
        let mut table = self.records.write().await;
        let before = table.len();
        for id in ids {
            table.remove(id);
        }
        let removed = (before - table.len()) as u64;
        if removed > 0 {
            *self.last_updated.lock().unwrap() = Some(Utc::now());
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<VectorStoreStats> {
        let table = self.records.read().await;
        Ok(VectorStoreStats {
            total_vectors: table.len() as u64,
            dimension: self.dimension,
            index_type: "flat-cosine".to_string(),
            last_updated: *self.last_updated.lock().unwrap(),
        })
    }

    async fn health(&self) -> Result<ProviderHealth> {
        let table = self.records.read().await;
        Ok(ProviderHealth::healthy().with_detail("total_vectors", table.len()))
    }
}
