//! Qdrant implementation of the vector store
//!
//! Remote backend behind the same `VectorStore` contract as the in-process
//! table. Collections use cosine distance, so Qdrant scores arrive as
//! similarities; a distance-metric collection would be mapped through
//! `score = 1 / (1 + distance)` instead.

use async_trait::async_trait;
use chrono::Utc;
use qdrant_client::qdrant::r#match::MatchValue;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, Condition, CreateCollection, DeletePoints, Distance,
    FieldCondition, Filter, Match, PointId, PointStruct, PointsIdsList, PointsSelector,
    SearchPoints, UpsertPoints, VectorParams, VectorsConfig,
};
use qdrant_client::Qdrant;
use sift_core::config::VectorConfig;
use sift_core::{
    ProviderHealth, Result, ScoredPoint, SearchParams, SiftError, VectorRecord, VectorStore,
    VectorStoreStats,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Payload field carrying the caller-visible record id
const EXTERNAL_ID_FIELD: &str = "external_id";

/// Qdrant-backed vector store
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Connect to Qdrant
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.qdrant_url)
            .build()
            .map_err(|e| SiftError::Provider(format!("qdrant connection failed: {e}")))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            dimension: config.dimension,
        })
    }

    /// Create the collection when it does not exist yet
    pub async fn init_collection(&self) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| SiftError::Provider(format!("failed to list collections: {e}")))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            self.client
                .create_collection(CreateCollection {
                    collection_name: self.collection.clone(),
                    vectors_config: Some(VectorsConfig {
                        config: Some(qdrant_client::qdrant::vectors_config::Config::Params(
                            VectorParams {
                                size: self.dimension as u64,
                                distance: Distance::Cosine.into(),
                                ..Default::default()
                            },
                        )),
                    }),
                    ..Default::default()
                })
                .await
                .map_err(|e| SiftError::Provider(format!("failed to create collection: {e}")))?;
        }

        Ok(())
    }

    /// Qdrant point ids must be integers or UUIDs; record ids are arbitrary
    /// strings, so they are hashed to a stable integer and kept in the
    /// payload for readback and deletion
    fn point_id(record_id: &str) -> PointId {
        let mut hasher = DefaultHasher::new();
        record_id.hash(&mut hasher);
        PointId {
            point_id_options: Some(PointIdOptions::Num(hasher.finish())),
        }
    }

    fn build_filter(filter: &HashMap<String, serde_json::Value>) -> Filter {
        let must = filter
            .iter()
            .map(|(key, value)| {
                let keyword = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Condition {
                    condition_one_of: Some(
                        qdrant_client::qdrant::condition::ConditionOneOf::Field(FieldCondition {
                            key: key.clone(),
                            r#match: Some(Match {
                                match_value: Some(MatchValue::Keyword(keyword)),
                            }),
                            ..Default::default()
                        }),
                    ),
                }
            })
            .collect();

        Filter {
            must,
            ..Default::default()
        }
    }
}

/// Qdrant payload value back to JSON
fn payload_value_to_json(value: qdrant_client::qdrant::Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::json!(i),
        Some(Kind::DoubleValue(d)) => serde_json::json!(d),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => serde_json::Value::Array(
            list.values.into_iter().map(payload_value_to_json).collect(),
        ),
        Some(Kind::StructValue(object)) => serde_json::Value::Object(
            object
                .fields
                .into_iter()
                .map(|(k, v)| (k, payload_value_to_json(v)))
                .collect(),
        ),
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = records
            .into_iter()
            .map(|record| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = record
                    .metadata
                    .into_iter()
                    .map(|(k, v)| (k, v.into()))
                    .collect();
                payload.insert(
                    EXTERNAL_ID_FIELD.to_string(),
                    serde_json::json!(record.id).into(),
                );

                PointStruct {
                    id: Some(Self::point_id(&record.id)),
                    vectors: Some(record.vector.into()),
                    payload,
                }
            })
            .collect();

        self.client
            .upsert_points(UpsertPoints {
                collection_name: self.collection.clone(),
                points,
                ..Default::default()
            })
            .await
            .map_err(|e| SiftError::Provider(format!("failed to upsert vectors: {e}")))?;

        Ok(())
    }

    async fn search(&self, vector: &[f32], params: &SearchParams) -> Result<Vec<ScoredPoint>> {
        let results = self
            .client
            .search_points(SearchPoints {
                collection_name: self.collection.clone(),
                vector: vector.to_vec(),
                limit: params.top_k as u64,
                filter: params.filter.as_ref().map(Self::build_filter),
                score_threshold: params.threshold,
                with_payload: Some(params.include_metadata.into()),
                ..Default::default()
            })
            .await
            .map_err(|e| SiftError::Search(format!("vector search failed: {e}")))?;

        let points = results
            .result
            .into_iter()
            .map(|point| {
                let mut metadata: HashMap<String, serde_json::Value> = HashMap::new();
                let mut external_id = None;
                for (key, value) in point.payload {
                    if key == EXTERNAL_ID_FIELD {
                        external_id = value.kind.as_ref().and_then(|k| match k {
                            Kind::StringValue(s) => Some(s.clone()),
                            _ => None,
                        });
                        continue;
                    }
                    metadata.insert(key, payload_value_to_json(value));
                }

                let id = external_id.unwrap_or_else(|| {
                    point
                        .id
                        .as_ref()
                        .and_then(|p| p.point_id_options.as_ref())
                        .map(|options| match options {
                            PointIdOptions::Num(n) => n.to_string(),
                            PointIdOptions::Uuid(u) => u.clone(),
                        })
                        .unwrap_or_default()
                });

                ScoredPoint {
                    id,
                    // Cosine collections score by similarity already
                    score: point.score.clamp(0.0, 1.0),
                    metadata,
                }
            })
            .collect();

        Ok(points)
    }

    async fn delete(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| Self::point_id(id)).collect();
        let selector = PointsSelector {
            points_selector_one_of: Some(
                qdrant_client::qdrant::points_selector::PointsSelectorOneOf::Points(
                    PointsIdsList { ids: point_ids },
                ),
            ),
        };

        self.client
            .delete_points(DeletePoints {
                collection_name: self.collection.clone(),
                points: Some(selector),
                ..Default::default()
            })
            .await
            .map_err(|e| SiftError::Provider(format!("failed to delete vectors: {e}")))?;

        Ok(ids.len() as u64)
    }

    async fn stats(&self) -> Result<VectorStoreStats> {
        let info = self
            .client
            .collection_info(self.collection.clone())
            .await
            .map_err(|e| SiftError::Provider(format!("failed to read collection info: {e}")))?;

        Ok(VectorStoreStats {
            total_vectors: info.result.and_then(|r| r.points_count).unwrap_or(0),
            dimension: self.dimension,
            index_type: "qdrant-hnsw".to_string(),
            last_updated: Some(Utc::now()),
        })
    }

    async fn health(&self) -> Result<ProviderHealth> {
        match self.client.list_collections().await {
            Ok(_) => Ok(ProviderHealth::healthy().with_detail("collection", self.collection.clone())),
            Err(e) => Ok(ProviderHealth::unhealthy(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_stable() {
        let a = QdrantStore::point_id("doc-1:0");
        let b = QdrantStore::point_id("doc-1:0");
        let c = QdrantStore::point_id("doc-1:1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_filter_build() {
        let mut filter = HashMap::new();
        filter.insert("source_id".to_string(), serde_json::json!("s1"));
        let built = QdrantStore::build_filter(&filter);
        assert_eq!(built.must.len(), 1);
    }

    #[test]
    fn test_payload_value_roundtrip() {
        let json = serde_json::json!({
            "title": "Doc",
            "position": 3,
            "score": 0.5,
            "tags": ["a", "b"],
            "nested": {"ok": true}
        });
        let qdrant_value: qdrant_client::qdrant::Value = json.clone().into();
        assert_eq!(payload_value_to_json(qdrant_value), json);
    }
}
