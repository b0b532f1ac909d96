//! The queryable data source behind every entity service.
//!
//! Implementations receive already-compiled queries ([`Filter`],
//! [`CompiledQuery`]) and never see raw field names, so the field registry
//! stays the single gate between a request and the storage layer.

use crate::query::{CompiledQuery, EntitySchema, Filter};
use async_trait::async_trait;
use uuid::Uuid;

/// A persisted, versioned row type.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Namespace for cache keys (`"company"` → `company:id:...`).
    const NAME: &'static str;

    fn id(&self) -> Uuid;

    /// Optimistic-concurrency token, incremented on every update.
    fn row_version(&self) -> i64;

    fn set_row_version(&mut self, version: i64);

    fn schema() -> &'static EntitySchema<Self>;

    /// Natural keys that must be unique across rows, as `(key name, normalized value)`.
    ///
    /// The key name doubles as the cache-key segment for lookups by that key.
    fn unique_keys(&self) -> Vec<(&'static str, String)>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("unique key `{0}` already exists")]
    UniqueViolation(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Result of a version-checked update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<E> {
    Updated(E),
    /// The stored row carries a different version; nothing was written.
    Conflict { actual: i64 },
    Missing,
}

#[async_trait]
pub trait EntitySource<E: Entity>: Send + Sync {
    /// Count rows matching `filter`.
    async fn count(&self, filter: &Filter<E>) -> Result<u64, SourceError>;

    /// Fetch rows matching the query's filter, in its order, within its window.
    async fn fetch(&self, query: &CompiledQuery<E>) -> Result<Vec<E>, SourceError>;

    async fn find(&self, id: Uuid) -> Result<Option<E>, SourceError>;

    async fn insert(&self, entity: E) -> Result<E, SourceError>;

    /// Write `entity` only if the stored version equals `expected_version`.
    /// On success the stored version becomes `expected_version + 1`.
    async fn update(&self, entity: E, expected_version: i64)
    -> Result<UpdateOutcome<E>, SourceError>;

    /// Remove a row, returning it if it existed.
    async fn delete(&self, id: Uuid) -> Result<Option<E>, SourceError>;

    /// Remove every row matching `filter`, returning how many went. An empty
    /// filter removes nothing.
    async fn delete_matching(&self, filter: &Filter<E>) -> Result<u64, SourceError>;
}

/// Loads related data onto fetched rows. Detail lookups pass one; list and
/// search paths do not.
#[async_trait]
pub trait IncludeApplier<E: Entity>: Send + Sync {
    async fn apply(&self, items: &mut [E]) -> Result<(), SourceError>;
}
