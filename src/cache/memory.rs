//! In-process [`CacheStore`] on a `DashMap`, with lazy expiry.

use super::{CacheError, CacheStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Clone, Default)]
pub struct MemoryCache {
    /// key → (expires_at, json)
    entries: Arc<DashMap<String, (Instant, String)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including any expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.0 > Instant::now())
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (expires_at, _)| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (expires_at, ref value) = *entry;
            if expires_at > now {
                return Ok(Some(value.clone()));
            }
        }
        // expired or absent; the read guard is released before removal
        self.entries.remove_if(key, |_, (expires_at, _)| *expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_owned(), (Instant::now() + ttl, value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn remove_by_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let Some(prefix) = pattern.strip_suffix('*') else {
            return Ok(usize::from(self.entries.remove(pattern).is_some()));
        };
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|key, (expires_at, _)| !key.starts_with(prefix) && *expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        trace!(pattern, removed, "cache pattern sweep");
        Ok(removed)
    }
}
