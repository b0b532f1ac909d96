//! Cache-aside services, one per entity.
//!
//! Reads check the cache first and fall through to the data source on a miss;
//! writes hit the data source first and then invalidate every key the write
//! could have made stale. The cache is never authoritative: when it fails,
//! reads go to the source and invalidation failures are only logged.

pub mod cached;
pub mod companies;
pub mod user_companies;
pub mod users;

pub use cached::{Dependent, EntityService};
pub use companies::CompanyService;
pub use user_companies::UserCompanyService;
pub use users::UserService;

use crate::data::{Entity, SourceError};
use crate::query::{PageResult, SearchError, SearchRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("row version mismatch: expected {expected}, stored {actual}")]
    Conflict { expected: i64, actual: i64 },
    #[error("`{0}` is already taken")]
    Duplicate(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<SourceError> for ServiceError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::UniqueViolation(key) => ServiceError::Duplicate(key),
            SourceError::Database(e) => ServiceError::Unexpected(e.into()),
        }
    }
}

impl From<SearchError> for ServiceError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Cancelled => ServiceError::Cancelled,
            SearchError::Source(e) => e.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::Validation(errors.to_string())
    }
}

/// An entity the generic service can cache, create and update.
pub trait Resource: Entity {
    /// Cached and returned representation.
    type Dto: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Create: Validate + DeserializeOwned + Send + 'static;
    type Update: Validate + DeserializeOwned + Send + 'static;

    /// Lower-cased JSON keys of [`Self::Dto`]; `fields=` keeps only these.
    const DTO_FIELDS: &'static [&'static str];

    fn to_dto(&self) -> Self::Dto;

    fn from_create(request: Self::Create, now: DateTime<Utc>) -> Self;

    /// Version the caller last saw, checked before the update is applied.
    fn expected_version(request: &Self::Update) -> i64;

    fn apply_update(&mut self, request: Self::Update, now: DateTime<Utc>);
}

/// The operations every entity exposes over HTTP.
#[async_trait]
pub trait CrudService: Send + Sync + 'static {
    type Dto: Serialize + Send + 'static;
    type Create: DeserializeOwned + Send + 'static;
    type Update: DeserializeOwned + Send + 'static;

    async fn get_by_id(&self, id: Uuid) -> ServiceResult<Self::Dto>;

    async fn get_all(&self) -> ServiceResult<Vec<Self::Dto>>;

    async fn get_active(&self) -> ServiceResult<Vec<Self::Dto>>;

    async fn search(
        &self,
        request: SearchRequest,
        cancel: &CancellationToken,
    ) -> ServiceResult<PageResult<Self::Dto>>;

    async fn create(&self, request: Self::Create) -> ServiceResult<Self::Dto>;

    async fn update(&self, id: Uuid, request: Self::Update) -> ServiceResult<Self::Dto>;

    async fn delete(&self, id: Uuid) -> ServiceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::companies::Company;
    use crate::data::user_companies::UserCompany;
    use crate::data::users::User;

    fn serialized_keys<R: Resource>(entity: &R) -> Vec<String> {
        let json = serde_json::to_value(entity.to_dto()).unwrap();
        let mut keys: Vec<_> = json
            .as_object()
            .unwrap()
            .keys()
            .map(|k| k.to_lowercase())
            .collect();
        keys.sort();
        keys
    }

    fn declared<R: Resource>() -> Vec<String> {
        let mut fields: Vec<_> = R::DTO_FIELDS.iter().map(|f| f.to_string()).collect();
        fields.sort();
        fields
    }

    #[test]
    fn dto_fields_match_serialized_keys() {
        let now = Utc::now();
        let company = Company::new("ACME", "Acme", now);
        let user = User::new("jdoe", "jdoe@example.com", now);
        assert_eq!(serialized_keys(&company), declared::<Company>());
        assert_eq!(serialized_keys(&user), declared::<User>());

        // includes are only serialized when loaded
        let link = UserCompany::new(user.id, company.id, "admin", now);
        let keys = serialized_keys(&link);
        assert!(keys.iter().all(|k| UserCompany::DTO_FIELDS.contains(&k.as_str())));
        assert_eq!(keys.len() + 2, UserCompany::DTO_FIELDS.len());
    }
}
