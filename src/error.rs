//! Service-level errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::store::StoreError;

/// Generic message returned to callers when an evaluation fails.
pub const EVALUATION_FAILED_MESSAGE: &str = "답변 평가 중 오류가 발생했습니다.";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed identifiers or parameters; rejected before any gateway call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A single required row is missing (own profile, own score).
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is known but does not own the row.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Store(StoreError),

    /// Provider detail is recorded in the usage log, never carried here.
    #[error("{}", EVALUATION_FAILED_MESSAGE)]
    EvaluationFailed,

    #[error("answer evaluation is not configured")]
    LlmUnavailable,
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { collection } => AppError::NotFound(collection),
            other => AppError::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            AppError::Store(_) => StatusCode::BAD_GATEWAY,
            AppError::EvaluationFailed => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::LlmUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            error!(target: "thinkscore", error = %self, %status, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
