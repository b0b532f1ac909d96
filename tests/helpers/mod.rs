#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use erpgrid::cache::{CacheError, CacheStore, CacheTtl, MemoryCache};
use erpgrid::data::companies::Company;
use erpgrid::data::{Entity, EntitySource, MemorySource, SourceError, UpdateOutcome};
use erpgrid::query::{CompiledQuery, Filter};
use erpgrid::services::CompanyService;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Fixed base time so `created_at` ordering is deterministic.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// A company created `minutes` after [`base_time`].
pub fn make_company(code: &str, minutes: i64, is_active: bool) -> Company {
    let mut company = Company::new(code, &format!("{code} Corp"), base_time() + Duration::minutes(minutes));
    company.is_active = is_active;
    company
}

/// Wraps a [`MemorySource`] and counts the round trips that reach it.
pub struct CountingSource<E: Entity> {
    inner: MemorySource<E>,
    reads: AtomicUsize,
}

impl<E: Entity> CountingSource<E> {
    pub fn new(rows: impl IntoIterator<Item = E>) -> Self {
        Self {
            inner: MemorySource::with_rows(rows),
            reads: AtomicUsize::new(0),
        }
    }

    /// `count`, `fetch` and `find` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<E: Entity> EntitySource<E> for CountingSource<E> {
    async fn count(&self, filter: &Filter<E>) -> Result<u64, SourceError> {
        self.hit();
        self.inner.count(filter).await
    }

    async fn fetch(&self, query: &CompiledQuery<E>) -> Result<Vec<E>, SourceError> {
        self.hit();
        self.inner.fetch(query).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<E>, SourceError> {
        self.hit();
        self.inner.find(id).await
    }

    async fn insert(&self, entity: E) -> Result<E, SourceError> {
        self.inner.insert(entity).await
    }

    async fn update(&self, entity: E, expected_version: i64) -> Result<UpdateOutcome<E>, SourceError> {
        self.inner.update(entity, expected_version).await
    }

    async fn delete(&self, id: Uuid) -> Result<Option<E>, SourceError> {
        self.inner.delete(id).await
    }

    async fn delete_matching(&self, filter: &Filter<E>) -> Result<u64, SourceError> {
        self.inner.delete_matching(filter).await
    }
}

/// A cache whose every operation fails, as if the store were down.
pub struct UnavailableCache;

#[async_trait]
impl CacheStore for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: std::time::Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn remove(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn remove_by_pattern(&self, _pattern: &str) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

pub struct CompanyFixture {
    pub service: CompanyService,
    pub source: Arc<CountingSource<Company>>,
    pub cache: MemoryCache,
}

pub fn company_fixture(rows: impl IntoIterator<Item = Company>) -> CompanyFixture {
    let source = Arc::new(CountingSource::new(rows));
    let cache = MemoryCache::new();
    let service = CompanyService::new(source.clone(), Arc::new(cache.clone()), CacheTtl::default());
    CompanyFixture {
        service,
        source,
        cache,
    }
}
