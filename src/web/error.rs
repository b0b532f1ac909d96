//! JSON error responses for the HTTP API.

use crate::services::ServiceError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;
use ts_rs::TS;

/// Machine-readable error code, serialized in `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ApiErrorCode {
    NotFound,
    Conflict,
    Duplicate,
    ValidationFailed,
    Cancelled,
    InternalError,
}

impl ApiErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
            ApiErrorCode::Conflict | ApiErrorCode::Duplicate => StatusCode::CONFLICT,
            ApiErrorCode::Cancelled => StatusCode::REQUEST_TIMEOUT,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NotFound, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InternalError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(entity) => ApiError::not_found(format!("{entity} not found")),
            e @ ServiceError::Conflict { .. } => ApiError::new(ApiErrorCode::Conflict, e.to_string()),
            e @ ServiceError::Duplicate(_) => ApiError::new(ApiErrorCode::Duplicate, e.to_string()),
            ServiceError::Validation(message) => {
                ApiError::new(ApiErrorCode::ValidationFailed, message)
            }
            ServiceError::Cancelled => ApiError::new(ApiErrorCode::Cancelled, "request cancelled"),
            ServiceError::Unexpected(e) => {
                error!(error = ?e, "unexpected service failure");
                ApiError::internal_error("internal server error")
            }
        }
    }
}
