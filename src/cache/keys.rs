//! Deterministic cache keys and invalidation patterns, namespaced per entity.
//!
//! ```text
//! company:id:{uuid}
//! company:code:{lower-cased value}
//! company:all | company:active
//! company:search:{fingerprint}
//! company:search:*  (pattern)
//! company:*         (pattern)
//! ```

use crate::query::SearchRequest;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheKeys {
    entity: &'static str,
}

impl CacheKeys {
    pub const fn new(entity: &'static str) -> Self {
        Self { entity }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn id(&self, id: Uuid) -> String {
        format!("{}:id:{id}", self.entity)
    }

    /// Key for a unique natural key (`code`, `email`, ...). Values are trimmed
    /// and lower-cased so lookups differing only in case share an entry.
    pub fn natural(&self, key: &str, value: &str) -> String {
        format!("{}:{key}:{}", self.entity, value.trim().to_lowercase())
    }

    pub fn all(&self) -> String {
        format!("{}:all", self.entity)
    }

    pub fn active(&self) -> String {
        format!("{}:active", self.entity)
    }

    /// Key for a search page. Callers pass an already-sanitized request.
    pub fn search(&self, request: &SearchRequest) -> String {
        format!("{}:search:{}", self.entity, request.fingerprint())
    }

    /// Matches every cached search page for this entity.
    pub fn search_pattern(&self) -> String {
        format!("{}:search:*", self.entity)
    }

    /// Matches every key of this entity, searches included.
    pub fn entity_pattern(&self) -> String {
        format!("{}:*", self.entity)
    }
}
