use super::{CrudService, Dependent, EntityService, Resource, ServiceError, ServiceResult};
use crate::cache::{CacheStore, CacheTtl};
use crate::data::companies::Company;
use crate::data::user_companies::{
    CreateUserCompanyRequest, UpdateUserCompanyRequest, UserCompany, UserCompanyDto,
    UserCompanyIncludes,
};
use crate::data::users::User;
use crate::data::{Entity, EntitySource, IncludeApplier};
use crate::query::{FilterClause, FilterOp, PageResult, SearchBuilder, SearchRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use validator::Validate;

impl Resource for UserCompany {
    type Dto = UserCompanyDto;
    type Create = CreateUserCompanyRequest;
    type Update = UpdateUserCompanyRequest;
    const DTO_FIELDS: &'static [&'static str] = &[
        "id", "userid", "companyid", "role", "isdefault", "isactive", "createdat",
        "updatedat", "rowversion", "user", "company",
    ];

    fn to_dto(&self) -> UserCompanyDto {
        UserCompanyDto::from(self)
    }

    fn from_create(request: CreateUserCompanyRequest, now: DateTime<Utc>) -> Self {
        request.into_link(now)
    }

    fn expected_version(request: &UpdateUserCompanyRequest) -> i64 {
        request.row_version
    }

    fn apply_update(&mut self, request: UpdateUserCompanyRequest, now: DateTime<Utc>) {
        request.apply(self, now);
    }
}

/// Links owned by a user or a company. They are deleted with their owner,
/// which Postgres also does through `ON DELETE CASCADE`.
pub struct LinkCascade {
    links: Arc<dyn EntitySource<UserCompany>>,
    owner_field: &'static str,
}

impl LinkCascade {
    pub fn by_user(links: Arc<dyn EntitySource<UserCompany>>) -> Self {
        Self {
            links,
            owner_field: "userId",
        }
    }

    pub fn by_company(links: Arc<dyn EntitySource<UserCompany>>) -> Self {
        Self {
            links,
            owner_field: "companyId",
        }
    }
}

#[async_trait]
impl<E: Entity> Dependent<E> for LinkCascade {
    fn namespace(&self) -> &'static str {
        UserCompany::NAME
    }

    async fn remove_for(&self, parent: &E) -> ServiceResult<u64> {
        let filter =
            SearchBuilder::<UserCompany>::for_entity().filter_eq(self.owner_field, parent.id());
        Ok(self.links.delete_matching(&filter).await?)
    }
}

/// Links need the user and company sources too: creation checks both ends
/// exist, and detail lookups attach their summaries.
pub struct UserCompanyService {
    inner: EntityService<UserCompany>,
    includes: UserCompanyIncludes,
}

impl UserCompanyService {
    pub fn new(
        source: Arc<dyn EntitySource<UserCompany>>,
        users: Arc<dyn EntitySource<User>>,
        companies: Arc<dyn EntitySource<Company>>,
        cache: Arc<dyn CacheStore>,
        ttl: CacheTtl,
    ) -> Self {
        Self {
            inner: EntityService::new(source, cache, ttl),
            includes: UserCompanyIncludes { users, companies },
        }
    }

    pub async fn get_by_pair(
        &self,
        user_id: Uuid,
        company_id: Uuid,
    ) -> ServiceResult<UserCompanyDto> {
        let filter = SearchBuilder::<UserCompany>::for_entity().filter(&[
            FilterClause::new("userId", FilterOp::Eq, user_id.to_string()),
            FilterClause::new("companyId", FilterOp::Eq, company_id.to_string()),
        ]);
        let key = self
            .inner
            .keys()
            .natural("pair", &UserCompany::pair_key(user_id, company_id));
        self.inner.get_first(key, filter).await
    }
}

#[async_trait]
impl CrudService for UserCompanyService {
    type Dto = UserCompanyDto;
    type Create = CreateUserCompanyRequest;
    type Update = UpdateUserCompanyRequest;

    async fn get_by_id(&self, id: Uuid) -> ServiceResult<UserCompanyDto> {
        let includes: &dyn IncludeApplier<UserCompany> = &self.includes;
        self.inner.get_by_id_with(id, Some(includes)).await
    }

    async fn get_all(&self) -> ServiceResult<Vec<UserCompanyDto>> {
        self.inner.get_all().await
    }

    async fn get_active(&self) -> ServiceResult<Vec<UserCompanyDto>> {
        self.inner.get_active().await
    }

    async fn search(
        &self,
        request: SearchRequest,
        cancel: &CancellationToken,
    ) -> ServiceResult<PageResult<UserCompanyDto>> {
        self.inner.search(request, cancel).await
    }

    async fn create(&self, request: CreateUserCompanyRequest) -> ServiceResult<UserCompanyDto> {
        request.validate()?;
        if self.includes.users.find(request.user_id).await?.is_none() {
            return Err(ServiceError::Validation(format!(
                "user {} does not exist",
                request.user_id
            )));
        }
        if self.includes.companies.find(request.company_id).await?.is_none() {
            return Err(ServiceError::Validation(format!(
                "company {} does not exist",
                request.company_id
            )));
        }
        self.inner
            .insert(UserCompany::from_create(request, Utc::now()))
            .await
    }

    async fn update(
        &self,
        id: Uuid,
        request: UpdateUserCompanyRequest,
    ) -> ServiceResult<UserCompanyDto> {
        self.inner.update(id, request).await
    }

    async fn delete(&self, id: Uuid) -> ServiceResult<()> {
        self.inner.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::data::MemorySource;

    struct Fixture {
        service: UserCompanyService,
        cache: MemoryCache,
        user: User,
        company: Company,
    }

    fn fixture() -> Fixture {
        let now = Utc::now();
        let user = User::new("jdoe", "jdoe@example.com", now);
        let company = Company::new("ACME", "Acme", now);
        let cache = MemoryCache::new();
        let service = UserCompanyService::new(
            Arc::new(MemorySource::new()),
            Arc::new(MemorySource::with_rows([user.clone()])),
            Arc::new(MemorySource::with_rows([company.clone()])),
            Arc::new(cache.clone()),
            CacheTtl::default(),
        );
        Fixture {
            service,
            cache,
            user,
            company,
        }
    }

    fn link_request(user_id: Uuid, company_id: Uuid) -> CreateUserCompanyRequest {
        CreateUserCompanyRequest {
            user_id,
            company_id,
            role: "admin".into(),
            is_default: true,
        }
    }

    #[tokio::test]
    async fn create_requires_existing_user_and_company() {
        let f = fixture();
        let err = f
            .service
            .create(link_request(Uuid::new_v4(), f.company.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.starts_with("user ")));

        let err = f
            .service
            .create(link_request(f.user.id, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.starts_with("company ")));
    }

    #[tokio::test]
    async fn duplicate_pair_is_rejected() {
        let f = fixture();
        f.service
            .create(link_request(f.user.id, f.company.id))
            .await
            .unwrap();
        let err = f
            .service
            .create(link_request(f.user.id, f.company.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Duplicate(ref key) if key == "pair"));
    }

    #[tokio::test]
    async fn detail_lookup_includes_summaries_and_pair_lookup_is_cached() {
        let f = fixture();
        let created = f
            .service
            .create(link_request(f.user.id, f.company.id))
            .await
            .unwrap();
        assert!(created.user.is_none());

        let detail = f.service.get_by_id(created.id).await.unwrap();
        assert_eq!(detail.user.unwrap().username, "jdoe");
        assert_eq!(detail.company.unwrap().name, "Acme");

        let by_pair = f
            .service
            .get_by_pair(f.user.id, f.company.id)
            .await
            .unwrap();
        assert_eq!(by_pair.id, created.id);
        let key = format!("usercompany:pair:{}:{}", f.user.id, f.company.id);
        assert!(f.cache.contains_key(&key));

        f.service.delete(created.id).await.unwrap();
        assert!(!f.cache.contains_key(&key));
        assert!(matches!(
            f.service.get_by_pair(f.user.id, f.company.id).await,
            Err(ServiceError::NotFound("usercompany"))
        ));
    }
}
