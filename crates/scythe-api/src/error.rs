//! API error types and JSON error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use scythe_repair::RepairError;
use scythe_store::StoreError;
use serde_json::json;

/// Errors returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The requested entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up.
        kind: &'static str,
        /// The missing key.
        id: String,
    },

    /// Malformed or invalid request.
    #[error("invalid request: {message}")]
    BadRequest {
        /// Description of the problem.
        message: String,
    },

    /// A storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A repair scheduling failure.
    #[error(transparent)]
    Repair(#[from] RepairError),
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Map to an HTTP status code.
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Store(e) => store_status(e),
            Self::Repair(e) => match e {
                RepairError::Store(e) => store_status(e),
                RepairError::Ring(_)
                | RepairError::InvalidIntensity(_)
                | RepairError::TooManySegments { .. } => StatusCode::BAD_REQUEST,
                RepairError::NotFound { .. } => StatusCode::NOT_FOUND,
                RepairError::InvalidState { .. } => StatusCode::CONFLICT,
                RepairError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Short machine-readable error code.
    fn code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::NOT_FOUND => "NotFound",
            StatusCode::BAD_REQUEST => "BadRequest",
            StatusCode::CONFLICT => "Conflict",
            _ => "InternalError",
        }
    }
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::AlreadyExists { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
