//! HTTP API handlers

pub mod health;
pub mod history;
pub mod sync;

pub use health::{health_check, health_routes};
pub use history::{cleanup_history, sync_history, sync_stats};
pub use sync::{sync_status, trigger_sync};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Handler-level error mapped to an HTTP status with a JSON body
#[derive(Debug)]
pub enum ApiError {
    Store(pgs_common::Error),
    Conflict(String),
}

impl From<pgs_common::Error> for ApiError {
    fn from(err: pgs_common::Error) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Store(err) => {
                let status = match &err {
                    pgs_common::Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    pgs_common::Error::NotFound(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
