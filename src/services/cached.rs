//! Generic cache-aside service over one entity type.

use super::{CrudService, Resource, ServiceError, ServiceResult};
use crate::cache::{CacheKeys, CacheStore, CacheTtl};
use crate::data::{EntitySource, IncludeApplier, UpdateOutcome};
use crate::query::{Filter, PageResult, SearchBuilder, SearchRequest};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Rows of another entity that reference an `E` and go away with it.
#[async_trait]
pub trait Dependent<E>: Send + Sync {
    /// Cache namespace of the dependent entity. Its cached views may embed
    /// data of `E`, so every update or delete of an `E` sweeps all of it.
    fn namespace(&self) -> &'static str;

    /// Remove the rows referencing `parent`, which has just been deleted.
    async fn remove_for(&self, parent: &E) -> ServiceResult<u64>;
}

pub struct EntityService<E: Resource> {
    source: Arc<dyn EntitySource<E>>,
    cache: Arc<dyn CacheStore>,
    ttl: CacheTtl,
    keys: CacheKeys,
    dependents: Vec<Arc<dyn Dependent<E>>>,
}

impl<E: Resource> EntityService<E> {
    pub fn new(source: Arc<dyn EntitySource<E>>, cache: Arc<dyn CacheStore>, ttl: CacheTtl) -> Self {
        Self {
            source,
            cache,
            ttl,
            keys: CacheKeys::new(E::NAME),
            dependents: Vec::new(),
        }
    }

    pub fn with_dependent(mut self, dependent: Arc<dyn Dependent<E>>) -> Self {
        self.dependents.push(dependent);
        self
    }

    pub fn source(&self) -> &Arc<dyn EntitySource<E>> {
        &self.source
    }

    pub fn keys(&self) -> CacheKeys {
        self.keys
    }

    /// Return the cached value under `key`, or run `load` and cache its result.
    ///
    /// Errors from `load` (including not-found and cancellation) are returned
    /// as-is and never cached. Cache failures only cost a trip to the source.
    pub(crate) async fn read_through<T, F>(
        &self,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> ServiceResult<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: Future<Output = ServiceResult<T>> + Send,
    {
        match self.cache.get(key).await {
            Ok(Some(json)) => match serde_json::from_str::<T>(&json) {
                Ok(value) => {
                    debug!(key, "cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(key, error = %e, "evicting undecodable cache entry");
                    if let Err(e) = self.cache.remove(key).await {
                        warn!(key, error = %e, "cache remove failed");
                    }
                }
            },
            Ok(None) => debug!(key, "cache miss"),
            Err(e) => warn!(key, error = %e, "cache read failed, using source"),
        }

        let value = load.await?;
        self.store(key, &value, ttl).await;
        Ok(value)
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "cache value not serializable");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, json, ttl).await {
            warn!(key, error = %e, "cache write failed");
        }
    }

    /// Look up one row by id, running `include` on it before caching.
    pub async fn get_by_id_with(
        &self,
        id: Uuid,
        include: Option<&dyn IncludeApplier<E>>,
    ) -> ServiceResult<E::Dto> {
        let key = self.keys.id(id);
        self.read_through(&key, self.ttl.entity, async {
            let mut entity = self
                .source
                .find(id)
                .await?
                .ok_or(ServiceError::NotFound(E::NAME))?;
            if let Some(include) = include {
                include.apply(std::slice::from_mut(&mut entity)).await?;
            }
            Ok::<_, ServiceError>(entity.to_dto())
        })
        .await
    }

    /// Case-insensitive lookup by a unique text column, cached under
    /// `{entity}:{key_name}:{value}`.
    pub async fn get_by_natural_key(
        &self,
        key_name: &str,
        field: &str,
        value: &str,
    ) -> ServiceResult<E::Dto> {
        let value = value.trim();
        let filter = SearchBuilder::<E>::for_entity().filter_eq_ignore_case(field, value);
        self.get_first(self.keys.natural(key_name, value), filter)
            .await
    }

    /// First row in default order matching `filter`, cached under `key`.
    ///
    /// An empty filter would match any row, so it is rejected as not-found.
    pub async fn get_first(&self, key: String, filter: Filter<E>) -> ServiceResult<E::Dto> {
        if filter.is_empty() {
            return Err(ServiceError::NotFound(E::NAME));
        }
        self.read_through(&key, self.ttl.entity, async {
            let builder = SearchBuilder::<E>::for_entity();
            let rows = builder.list(self.source.as_ref(), filter).await?;
            rows.first()
                .map(E::to_dto)
                .ok_or(ServiceError::NotFound(E::NAME))
        })
        .await
    }

    async fn list_cached(&self, key: String, filter: Filter<E>) -> ServiceResult<Vec<E::Dto>> {
        self.read_through(&key, self.ttl.list, async {
            let builder = SearchBuilder::<E>::for_entity();
            let rows = builder.list(self.source.as_ref(), filter).await?;
            Ok::<_, ServiceError>(rows.iter().map(E::to_dto).collect::<Vec<_>>())
        })
        .await
    }

    /// Insert a row built elsewhere and invalidate what it affects.
    pub async fn insert(&self, entity: E) -> ServiceResult<E::Dto> {
        let stored = self.source.insert(entity).await?;
        info!(entity = E::NAME, id = %stored.id(), "created");
        self.invalidate(None, Some(&stored)).await;
        Ok(stored.to_dto())
    }

    /// Drop every cached view a write to `before`/`after` could have changed.
    ///
    /// Failures are logged; the write they follow has already committed.
    pub async fn invalidate(&self, before: Option<&E>, after: Option<&E>) {
        let mut keys = Vec::new();
        for entity in before.into_iter().chain(after) {
            keys.push(self.keys.id(entity.id()));
            for (name, value) in entity.unique_keys() {
                keys.push(self.keys.natural(name, &value));
            }
        }
        keys.push(self.keys.all());
        keys.push(self.keys.active());
        keys.sort_unstable();
        keys.dedup();

        for key in &keys {
            if let Err(e) = self.cache.remove(key).await {
                warn!(key, error = %e, "cache invalidation failed");
            }
        }

        let pattern = self.keys.search_pattern();
        match self.cache.remove_by_pattern(&pattern).await {
            Ok(removed) => debug!(%pattern, removed, "search cache swept"),
            Err(e) => warn!(%pattern, error = %e, "search cache sweep failed"),
        }
    }

    /// Drop every cached view of the dependent entities.
    async fn sweep_dependents(&self) {
        for dependent in &self.dependents {
            let pattern = CacheKeys::new(dependent.namespace()).entity_pattern();
            match self.cache.remove_by_pattern(&pattern).await {
                Ok(removed) => debug!(%pattern, removed, "dependent cache swept"),
                Err(e) => warn!(%pattern, error = %e, "dependent cache sweep failed"),
            }
        }
    }
}

#[async_trait]
impl<E: Resource> CrudService for EntityService<E> {
    type Dto = E::Dto;
    type Create = E::Create;
    type Update = E::Update;

    async fn get_by_id(&self, id: Uuid) -> ServiceResult<E::Dto> {
        self.get_by_id_with(id, None).await
    }

    async fn get_all(&self) -> ServiceResult<Vec<E::Dto>> {
        self.list_cached(self.keys.all(), Filter::all()).await
    }

    async fn get_active(&self) -> ServiceResult<Vec<E::Dto>> {
        let filter = SearchBuilder::<E>::for_entity().filter_eq("isActive", true);
        self.list_cached(self.keys.active(), filter).await
    }

    async fn search(
        &self,
        request: SearchRequest,
        cancel: &CancellationToken,
    ) -> ServiceResult<PageResult<E::Dto>> {
        let builder = SearchBuilder::<E>::for_entity();
        let mut request = builder.sanitize(request);
        request.fields.retain(|f| E::DTO_FIELDS.contains(&f.as_str()));
        let key = self.keys.search(&request);
        self.read_through(&key, self.ttl.search, async {
            let page = builder
                .execute(self.source.as_ref(), &request, None, cancel)
                .await?;
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }
            Ok(page.map(|e| e.to_dto()))
        })
        .await
    }

    async fn create(&self, request: E::Create) -> ServiceResult<E::Dto> {
        request.validate()?;
        self.insert(E::from_create(request, Utc::now())).await
    }

    async fn update(&self, id: Uuid, request: E::Update) -> ServiceResult<E::Dto> {
        request.validate()?;
        let expected = E::expected_version(&request);
        let current = self
            .source
            .find(id)
            .await?
            .ok_or(ServiceError::NotFound(E::NAME))?;
        if current.row_version() != expected {
            return Err(ServiceError::Conflict {
                expected,
                actual: current.row_version(),
            });
        }

        let mut next = current.clone();
        next.apply_update(request, Utc::now());
        match self.source.update(next, expected).await? {
            UpdateOutcome::Updated(updated) => {
                info!(entity = E::NAME, %id, version = updated.row_version(), "updated");
                self.invalidate(Some(&current), Some(&updated)).await;
                self.sweep_dependents().await;
                Ok(updated.to_dto())
            }
            UpdateOutcome::Conflict { actual } => Err(ServiceError::Conflict { expected, actual }),
            UpdateOutcome::Missing => Err(ServiceError::NotFound(E::NAME)),
        }
    }

    async fn delete(&self, id: Uuid) -> ServiceResult<()> {
        let removed = self
            .source
            .delete(id)
            .await?
            .ok_or(ServiceError::NotFound(E::NAME))?;
        info!(entity = E::NAME, %id, "deleted");
        for dependent in &self.dependents {
            match dependent.remove_for(&removed).await {
                Ok(0) => {}
                Ok(count) => {
                    info!(entity = dependent.namespace(), count, parent = %id, "cascaded delete")
                }
                Err(e) => warn!(
                    entity = dependent.namespace(),
                    parent = %id,
                    error = %e,
                    "cascaded delete failed"
                ),
            }
        }
        self.invalidate(Some(&removed), None).await;
        self.sweep_dependents().await;
        Ok(())
    }
}
