//! Statistics handlers

use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// GET /api/v1/stats/cache
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();
    Json(state.cache.stats().await)
}

/// GET /api/v1/stats/performance
pub async fn performance_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();
    Json(state.monitor.performance())
}

#[derive(Serialize)]
pub struct WarmerStats {
    pub is_warming: bool,
    pub tracked_queries: usize,
}

/// GET /api/v1/stats/warmer
pub async fn warmer_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();
    Json(WarmerStats {
        is_warming: state.warmer.is_warming(),
        tracked_queries: state.warmer.usage_snapshot().len(),
    })
}

#[derive(Serialize)]
pub struct ServerStats {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub requests_per_second: f64,
}

/// GET /api/v1/stats/server
pub async fn server_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.uptime_secs();
    let total_requests = state.get_request_count();
    let rps = if uptime > 0 {
        total_requests as f64 / uptime as f64
    } else {
        0.0
    };

    Json(ServerStats {
        uptime_seconds: uptime,
        total_requests,
        requests_per_second: rps,
    })
}
