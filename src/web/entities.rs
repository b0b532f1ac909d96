//! Handlers shared by every entity: list, active, search, and CRUD by id.

use super::error::ApiError;
use super::extract::{ApiJson, ApiPath};
use super::projection::project_page;
use crate::query::{PageLimits, SearchRequest};
use crate::services::CrudService;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct EntityState<S> {
    pub service: Arc<S>,
    pub limits: PageLimits,
}

impl<S> Clone for EntityState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            limits: self.limits,
        }
    }
}

/// `/`, `/active`, `/search` and `/{id}` for one entity service.
pub fn entity_router<S: CrudService>(state: EntityState<S>) -> Router {
    Router::new()
        .route("/", get(list_all::<S>).post(create::<S>))
        .route("/active", get(list_active::<S>))
        .route("/search", get(search::<S>))
        .route(
            "/{id}",
            get(get_one::<S>).put(update::<S>).delete(remove::<S>),
        )
        .with_state(state)
}

async fn list_all<S: CrudService>(
    State(state): State<EntityState<S>>,
) -> Result<Json<Vec<S::Dto>>, ApiError> {
    Ok(Json(state.service.get_all().await?))
}

async fn list_active<S: CrudService>(
    State(state): State<EntityState<S>>,
) -> Result<Json<Vec<S::Dto>>, ApiError> {
    Ok(Json(state.service.get_active().await?))
}

/// Parses the raw query string leniently: anything malformed is ignored.
async fn search<S: CrudService>(
    State(state): State<EntityState<S>>,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let request = SearchRequest::from_query_str(query.as_deref().unwrap_or_default(), state.limits);
    let fields = request.fields.clone();

    // Dropping this handler (client gone) cancels the in-flight queries.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let page = state.service.search(request, &cancel).await?;
    let json = serde_json::to_value(&page)
        .map_err(|_| ApiError::internal_error("failed to encode search results"))?;
    Ok(Json(project_page(json, &fields)))
}

async fn get_one<S: CrudService>(
    State(state): State<EntityState<S>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<S::Dto>, ApiError> {
    Ok(Json(state.service.get_by_id(id).await?))
}

async fn create<S: CrudService>(
    State(state): State<EntityState<S>>,
    ApiJson(body): ApiJson<S::Create>,
) -> Result<Response, ApiError> {
    let created = state.service.create(body).await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn update<S: CrudService>(
    State(state): State<EntityState<S>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<S::Update>,
) -> Result<Json<S::Dto>, ApiError> {
    Ok(Json(state.service.update(id, body).await?))
}

async fn remove<S: CrudService>(
    State(state): State<EntityState<S>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
