//! services/api/src/error.rs
//!
//! Defines the primary error type for the API service and its mapping onto
//! HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;
use deliberation_core::ports::PortError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// An error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// An error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// A standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    /// Maps the error taxonomy onto status codes: validation and not-found
    /// are reported with enough detail for the caller to correct the
    /// request; storage and upstream failures are logged and surfaced
    /// generically.
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Port(PortError::Validation(detail)) => {
                (StatusCode::BAD_REQUEST, detail.clone())
            }
            ApiError::Port(PortError::NotFound(detail)) => {
                (StatusCode::NOT_FOUND, detail.clone())
            }
            ApiError::Port(PortError::Upstream(detail)) => {
                error!("Upstream provider failure: {}", detail);
                (StatusCode::BAD_GATEWAY, "AI provider unavailable".to_string())
            }
            other => {
                error!("Internal error serving request: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
