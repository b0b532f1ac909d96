//! Application state shared by the HTTP handlers.

use crate::cache::{CacheStore, CacheTtl, MemoryCache};
use crate::data::companies::Company;
use crate::data::user_companies::UserCompany;
use crate::data::users::User;
use crate::data::{EntitySource, MemorySource, PgSource};
use crate::query::PageLimits;
use crate::services::user_companies::LinkCascade;
use crate::services::{CompanyService, UserCompanyService, UserService};
use sqlx::PgPool;
use std::sync::Arc;

/// One data source per entity.
pub struct Sources {
    pub companies: Arc<dyn EntitySource<Company>>,
    pub users: Arc<dyn EntitySource<User>>,
    pub user_companies: Arc<dyn EntitySource<UserCompany>>,
}

impl Sources {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            companies: Arc::new(PgSource::new(pool.clone())),
            users: Arc::new(PgSource::new(pool.clone())),
            user_companies: Arc::new(PgSource::new(pool)),
        }
    }

    pub fn memory() -> Self {
        Self {
            companies: Arc::new(MemorySource::new()),
            users: Arc::new(MemorySource::new()),
            user_companies: Arc::new(MemorySource::new()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub companies: Arc<CompanyService>,
    pub users: Arc<UserService>,
    pub user_companies: Arc<UserCompanyService>,
    pub cache: Arc<dyn CacheStore>,
    pub limits: PageLimits,
}

impl AppState {
    pub fn new(
        sources: Sources,
        cache: Arc<dyn CacheStore>,
        ttl: CacheTtl,
        limits: PageLimits,
    ) -> Self {
        let companies = CompanyService::new(sources.companies.clone(), cache.clone(), ttl)
            .with_dependent(Arc::new(LinkCascade::by_company(
                sources.user_companies.clone(),
            )));
        let users = UserService::new(sources.users.clone(), cache.clone(), ttl).with_dependent(
            Arc::new(LinkCascade::by_user(sources.user_companies.clone())),
        );
        let user_companies = UserCompanyService::new(
            sources.user_companies,
            sources.users,
            sources.companies,
            cache.clone(),
            ttl,
        );
        Self {
            companies: Arc::new(companies),
            users: Arc::new(users),
            user_companies: Arc::new(user_companies),
            cache,
            limits,
        }
    }

    /// Everything in memory: no database, a process-local cache.
    pub fn in_memory(ttl: CacheTtl, limits: PageLimits) -> Self {
        Self::new(Sources::memory(), Arc::new(MemoryCache::new()), ttl, limits)
    }
}
