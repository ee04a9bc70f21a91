//! Health check handlers

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use sift_core::HealthStatus;
use std::sync::Arc;

/// Liveness response
#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// GET /health - basic liveness probe
pub async fn liveness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(LivenessResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_secs(),
    })
}

/// GET /health/system - full component probe
pub async fn system_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();
    let health = state.health.check().await;

    let status = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(health))
}

/// GET /health/components - most recent component snapshot
pub async fn components(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();
    match state.health.last() {
        Some(health) => Json(serde_json::json!(health.components)),
        None => Json(serde_json::json!([])),
    }
}

/// GET /health/trends - trend analysis over the metric window
pub async fn trends(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();
    Json(state.monitor.trends())
}

/// GET /health/alerts - recent alerts
pub async fn alerts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();
    Json(state.monitor.alerts())
}
