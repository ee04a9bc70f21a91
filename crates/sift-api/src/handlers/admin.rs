//! Admin handlers: hot config updates and cache maintenance

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use sift_core::config::ConfigPatch;
use std::sync::Arc;

#[derive(Serialize)]
pub struct PatchResponse {
    pub applied: bool,
}

/// PATCH /api/v1/config - apply hot-updatable knobs
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<ConfigPatch>,
) -> impl IntoResponse {
    state.increment_requests();

    state.processor.update_config(&patch).await;
    state.warmer.clone().update_config(&patch);
    if let Some(thresholds) = &patch.thresholds {
        state.monitor.set_thresholds(thresholds.clone());
    }

    tracing::info!("configuration patch applied");
    Json(PatchResponse { applied: true })
}

#[derive(Serialize)]
pub struct InvalidateResponse {
    pub deleted: u64,
}

/// DELETE /api/v1/cache - drop every cache entry
pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.increment_requests();
    let deleted = state.cache.clear_all().await?;
    Ok(Json(InvalidateResponse { deleted }))
}

/// DELETE /api/v1/cache/source/:source_id - drop warm queries for a source
pub async fn invalidate_source(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.increment_requests();
    let deleted = state.warmer.invalidate_for_source(&source_id).await?;
    Ok(Json(InvalidateResponse { deleted }))
}
