//! API integration tests over the in-process router

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use sift_api::{build_router, AppState};
use sift_backends::{InMemoryVectorStore, StaticSourceRegistry};
use sift_cache::{CacheStore, MemoryBackend};
use sift_core::config::AppConfig;
use sift_core::{
    DataSource, Embedding, EmbeddingProvider, ProviderHealth, Result as SiftResult,
};
use sift_health::{HealthService, PerformanceMonitor};
use sift_index::Indexer;
use sift_query::{CacheWarmer, QueryProcessor, TemplateSynthesizer};
use sift_search::SearchEngine;
use std::sync::Arc;
use tower::ServiceExt;

/// Deterministic embedder: vectors derived from text bytes
struct StubEmbedder;

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> SiftResult<Embedding> {
        let mut vector = vec![0.0f32; 8];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % 8] += byte as f32 / 255.0;
        }
        Ok(Embedding::new(vector, "stub"))
    }

    async fn embed_batch(&self, texts: &[String]) -> SiftResult<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    async fn health(&self) -> SiftResult<ProviderHealth> {
        Ok(ProviderHealth::healthy())
    }

    fn dimension(&self) -> usize {
        8
    }
}

fn test_app() -> Router {
    let config = AppConfig::default();

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(StubEmbedder);
    let vectors = Arc::new(InMemoryVectorStore::new(8));
    let cache = Arc::new(CacheStore::new(
        Arc::new(MemoryBackend::new(16 * 1024 * 1024)),
        config.cache.clone(),
    ));
    let registry = Arc::new(StaticSourceRegistry::new(vec![DataSource::new(
        "src-1",
        "Test Source",
        "memory",
    )]));

    let engine = Arc::new(SearchEngine::new(
        embedder.clone(),
        vectors.clone(),
        config.search.clone(),
    ));
    let indexer = Arc::new(Indexer::new(
        embedder.clone(),
        vectors.clone(),
        cache.clone(),
        config.index.clone(),
    ));
    let monitor = Arc::new(PerformanceMonitor::new(config.health.clone()));
    let processor = Arc::new(
        QueryProcessor::new(
            cache.clone(),
            engine,
            embedder.clone(),
            registry.clone(),
            Arc::new(TemplateSynthesizer),
            config.query.clone(),
        )
        .with_monitor(monitor.clone()),
    );
    let warmer = Arc::new(CacheWarmer::new(
        cache.clone(),
        processor.clone(),
        config.warmer.clone(),
    ));
    let health = Arc::new(HealthService::new(
        cache.clone(),
        registry,
        embedder,
        vectors,
        monitor.clone(),
    ));

    let state = Arc::new(AppState::new(
        config, processor, warmer, indexer, health, monitor, cache,
    ));
    build_router(state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_liveness() {
    let app = test_app();
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_query_validation_rejected() {
    let app = test_app();
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/query",
            serde_json::json!({ "query": "   " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION");
}

#[tokio::test]
async fn test_index_then_query_roundtrip() {
    let app = test_app();

    let content = serde_json::json!({
        "contents": [{
            "id": "doc-1",
            "source_id": "src-1",
            "title": "Rust async guide",
            "text": "Asynchronous Rust relies on futures and executors. \
                     The tokio runtime drives tasks to completion. ".repeat(4),
            "metadata": {},
            "chunks": [],
            "embedding": null,
            "version": 1,
            "last_updated": chrono::Utc::now().to_rfc3339()
        }]
    });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/index", content))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["succeeded"], 1);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/query",
            serde_json::json!({ "query": "tokio runtime tasks" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["cached"], false);
    assert!(body["response"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn test_strategies_listing() {
    let app = test_app();
    let response = app.oneshot(get("/api/v1/index/strategies")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!(["sliding_window", "sentence_based"]));
}

#[tokio::test]
async fn test_unknown_strategy_rejected() {
    let app = test_app();
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/index",
            serde_json::json!({ "contents": [], "strategy": "semantic_magic" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_system_health() {
    let app = test_app();
    let response = app.oneshot(get("/health/system")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["components"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_cache_stats_endpoint() {
    let app = test_app();
    let response = app.oneshot(get("/api/v1/stats/cache")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["hits"], 0);
    assert_eq!(body["misses"], 0);
}

#[tokio::test]
async fn test_config_patch() {
    let app = test_app();
    let response = app
        .oneshot(json_request(
            "PATCH",
            "/api/v1/config",
            serde_json::json!({ "default_timeout_ms": 5000, "cache_enabled": false }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["applied"], true);
}

#[tokio::test]
async fn test_cancel_unknown_query() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/query/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_active_queries_empty() {
    let app = test_app();
    let response = app.oneshot(get("/api/v1/query/active")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["active_queries"], 0);
}
