//! Sift API - HTTP hosting layer
//!
//! Wires the core components together behind an axum router: query
//! processing, indexing, health, stats, and hot configuration updates.
//! Correlation, auth, and rate limiting belong to the deployment in front
//! of this service.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
