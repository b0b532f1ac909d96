//! `Path` and `Json` extractors whose rejections are [`ApiError`]s, so a bad
//! id or body gets the same `{code, message}` shape as every other failure.

use super::error::{ApiError, ApiErrorCode};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts};
use tracing::debug;

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        debug!(status = %rejection.status(), "path rejected");
        ApiError::new(ApiErrorCode::ValidationFailed, rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = %rejection.status(), "body rejected");
        ApiError::new(ApiErrorCode::ValidationFailed, rejection.body_text())
    }
}
