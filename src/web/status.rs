//! Health endpoint.

use axum::response::Json;
use serde::Serialize;
use tracing::trace;
use ts_rs::TS;

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct HealthResponse {
    status: String,
    version: String,
    commit: String,
}

pub(super) async fn health() -> Json<HealthResponse> {
    trace!("health check requested");
    Json(HealthResponse {
        status: "ok".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        commit: env!("GIT_COMMIT_SHORT").to_owned(),
    })
}
