//! Indexing handlers

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use sift_core::{Content, ContentChange};
use sift_index::ChunkStrategy;
use std::sync::Arc;

/// Index request body
#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    /// Contents to index
    pub contents: Vec<Content>,

    /// Chunking strategy name; defaults to the configured strategy
    pub strategy: Option<String>,
}

/// POST /api/v1/index
pub async fn index_contents(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IndexRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.increment_requests();

    let strategy = match request.strategy.as_deref() {
        Some(name) => Some(name.parse::<ChunkStrategy>()?),
        None => None,
    };

    let batch = state.indexer.batch_index(&request.contents, strategy).await;
    Ok(Json(batch))
}

/// Change request body
#[derive(Debug, Deserialize)]
pub struct ChangeRequest {
    pub source_id: String,
    pub changes: Vec<ContentChange>,
}

/// POST /api/v1/index/changes
pub async fn apply_changes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.increment_requests();
    let batch = state
        .indexer
        .update_index(&request.source_id, &request.changes)
        .await;
    Ok(Json(batch))
}

/// GET /api/v1/index/strategies
pub async fn strategies(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();
    Json(state.indexer.available_strategies())
}
