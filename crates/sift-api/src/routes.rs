//! Route table

use crate::handlers;
use crate::state::AppState;
use axum::http::HeaderValue;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = if state.config.server.cors_enabled {
        let origins: Vec<HeaderValue> = state
            .config
            .server
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    } else {
        CorsLayer::new()
    };

    Router::new()
        // Health surface
        .route("/health", get(handlers::health::liveness))
        .route("/health/system", get(handlers::health::system_health))
        .route("/health/components", get(handlers::health::components))
        .route("/health/trends", get(handlers::health::trends))
        .route("/health/alerts", get(handlers::health::alerts))
        // Query surface
        .route("/api/v1/query", post(handlers::query::process_query))
        .route("/api/v1/query/active", get(handlers::query::active_queries))
        .route(
            "/api/v1/query/:id",
            get(handlers::query::query_status).delete(handlers::query::cancel_query),
        )
        // Indexing surface
        .route("/api/v1/index", post(handlers::index::index_contents))
        .route("/api/v1/index/changes", post(handlers::index::apply_changes))
        .route("/api/v1/index/strategies", get(handlers::index::strategies))
        // Stats surface
        .route("/api/v1/stats/cache", get(handlers::stats::cache_stats))
        .route(
            "/api/v1/stats/performance",
            get(handlers::stats::performance_stats),
        )
        .route("/api/v1/stats/warmer", get(handlers::stats::warmer_stats))
        .route("/api/v1/stats/server", get(handlers::stats::server_stats))
        // Admin surface
        .route("/api/v1/config", patch(handlers::admin::update_config))
        .route("/api/v1/cache", delete(handlers::admin::clear_cache))
        .route(
            "/api/v1/cache/source/:source_id",
            delete(handlers::admin::invalidate_source),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
