//! Natural-key lookups: the per-entity routes that are not plain CRUD.

use super::error::ApiError;
use super::extract::ApiPath;
use crate::data::companies::CompanyDto;
use crate::data::user_companies::UserCompanyDto;
use crate::data::users::UserDto;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use uuid::Uuid;

/// `GET /api/companies/by-code/{code}`
pub(super) async fn company_by_code(
    State(state): State<AppState>,
    ApiPath(code): ApiPath<String>,
) -> Result<Json<CompanyDto>, ApiError> {
    Ok(Json(state.companies.get_by_code(&code).await?))
}

/// `GET /api/users/by-email/{email}`
pub(super) async fn user_by_email(
    State(state): State<AppState>,
    ApiPath(email): ApiPath<String>,
) -> Result<Json<UserDto>, ApiError> {
    Ok(Json(state.users.get_by_email(&email).await?))
}

/// `GET /api/users/by-username/{username}`
pub(super) async fn user_by_username(
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
) -> Result<Json<UserDto>, ApiError> {
    Ok(Json(state.users.get_by_username(&username).await?))
}

/// `GET /api/user-companies/by-pair/{user_id}/{company_id}`
pub(super) async fn link_by_pair(
    State(state): State<AppState>,
    ApiPath((user_id, company_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<UserCompanyDto>, ApiError> {
    Ok(Json(
        state.user_companies.get_by_pair(user_id, company_id).await?,
    ))
}
