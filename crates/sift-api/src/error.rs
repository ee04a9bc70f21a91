//! API error mapping
//!
//! Maps the core error taxonomy onto HTTP statuses with a JSON envelope
//! carrying the stable error code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sift_core::SiftError;

/// Error envelope returned to clients
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Error type used by all handlers
#[derive(Debug)]
pub struct ApiError(pub SiftError);

impl From<SiftError> for ApiError {
    fn from(error: SiftError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SiftError::Validation { .. } => StatusCode::BAD_REQUEST,
            SiftError::CapacityExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            SiftError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            SiftError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}
