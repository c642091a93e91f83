//! API error taxonomy and HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use chantier_engine::ApplyError;
use chantier_storage::StorageError;

/// Construct a JSON error response with the given status code and message.
pub(crate) fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({"success": false, "error": message})),
    )
}

/// Errors a handler can return. Converted into the response envelope by
/// the `IntoResponse` impl, so handlers use `?` throughout.
#[derive(Debug)]
pub(crate) enum ApiError {
    NotFound(String),
    Validation(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::NotFound(m) | ApiError::Validation(m) | ApiError::Conflict(m) => m.clone(),
            ApiError::Internal(detail) => {
                // Full context stays in the logs; clients get a generic line.
                tracing::error!("internal error: {detail}");
                "internal server error".to_string()
            }
        };
        json_error(self.status(), &message).into_response()
    }
}

impl From<ApplyError> for ApiError {
    fn from(e: ApplyError) -> Self {
        match e {
            ApplyError::ClientNotFound(_) | ApplyError::QuoteNotFound { .. } => {
                ApiError::NotFound(e.to_string())
            }
            ApplyError::ClientAlreadyExists(_) => ApiError::Conflict(e.to_string()),
            ApplyError::Validation(_) => ApiError::Validation(e.to_string()),
            ApplyError::Storage(inner) => inner.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ClientNotFound { .. } | StorageError::QuoteNotFound { .. } => {
                ApiError::NotFound(e.to_string())
            }
            StorageError::AlreadyInitialized { .. } | StorageError::ConcurrentConflict { .. } => {
                ApiError::Conflict(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}
