//! Query handlers

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use sift_core::{Query, QueryFilter};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Query request body
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// Query text
    pub query: String,

    /// Optional request context (domain, recency hints)
    pub context: Option<HashMap<String, String>>,

    /// Optional structured filters
    pub filters: Option<Vec<QueryFilter>>,

    /// Requesting user
    pub user_id: Option<String>,
}

/// POST /api/v1/query
pub async fn process_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.increment_requests();

    let mut query = Query::new(request.query)?;
    if let Some(context) = request.context {
        query = query.with_context(context);
    }
    if let Some(filters) = request.filters {
        query = query.with_filters(filters);
    }
    if let Some(user_id) = request.user_id {
        query = query.with_user(user_id);
    }

    let result = state.processor.process(query).await?;
    Ok(Json(result))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// DELETE /api/v1/query/:id
pub async fn cancel_query(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    state.increment_requests();
    let cancelled = state.processor.cancel(id);
    let status = if cancelled {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(CancelResponse { cancelled }))
}

/// GET /api/v1/query/:id
pub async fn query_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    state.increment_requests();
    match state.processor.query_status(id) {
        Some(status) => (StatusCode::OK, Json(serde_json::json!(status))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no active query with that id" })),
        ),
    }
}

#[derive(Debug, Serialize)]
pub struct ActiveResponse {
    pub active_queries: usize,
}

/// GET /api/v1/query/active
pub async fn active_queries(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();
    Json(ActiveResponse {
        active_queries: state.processor.active_count(),
    })
}
