//! Sift API Server
//!
//! REST server for the Sift retrieval-augmented query system.

use sift_api::{build_router, AppState};
use sift_backends::{create_embedding_provider, create_vector_store, StaticSourceRegistry};
use sift_cache::{CacheStore, MemoryBackend};
use sift_core::config::AppConfig;
use sift_core::DataSource;
use sift_health::{HealthService, PerformanceMonitor};
use sift_index::Indexer;
use sift_query::{CacheWarmer, QueryProcessor, TemplateSynthesizer};
use sift_search::SearchEngine;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration: optional TOML file, env always wins
    let config = match std::env::var("SIFT_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env().unwrap_or_default(),
    };

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("sift={},tower_http=info", config.logging.level).into());
    if config.logging.json_format {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Backends
    let embedder = create_embedding_provider(&config.embedding)?;
    tracing::info!(
        provider = ?config.embedding.provider,
        model = config.embedding.model,
        dimension = embedder.dimension(),
        "embedding provider initialized"
    );

    let vectors = create_vector_store(&config.vector).await?;
    tracing::info!(backend = ?config.vector.backend, "vector store initialized");

    let cache = Arc::new(CacheStore::new(
        Arc::new(MemoryBackend::new(config.cache.max_memory_bytes)),
        config.cache.clone(),
    ));

    let registry = Arc::new(StaticSourceRegistry::new(vec![DataSource::new(
        "default",
        "Default source",
        "local",
    )]));

    // Core components
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

    let (usage_tx, usage_rx) = tokio::sync::mpsc::unbounded_channel();
    let processor = Arc::new(
        QueryProcessor::new(
            cache.clone(),
            engine,
            embedder.clone(),
            registry.clone(),
            Arc::new(TemplateSynthesizer),
            config.query.clone(),
        )
        .with_monitor(monitor.clone())
        .with_usage_sink(usage_tx),
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

    // Background loops
    let usage_token = warmer.clone().spawn_usage_consumer(usage_rx);
    warmer.clone().start();
    let monitor_token = monitor.clone().spawn_background();
    let health_token = health.clone().spawn_background();

    // HTTP surface
    let state = Arc::new(AppState::new(
        config.clone(),
        processor,
        warmer.clone(),
        indexer,
        health,
        monitor,
        cache,
    ));
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Sift API server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Stop background work before exit
    warmer.stop();
    usage_token.cancel();
    monitor_token.cancel();
    health_token.cancel();

    Ok(())
}
