//! Key-value cache abstraction used by the cache-aside services.

pub mod keys;
pub mod memory;

pub use keys::CacheKeys;
pub use memory::MemoryCache;

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache value could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A string-keyed store of JSON values with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key matching `pattern`, returning how many were removed.
    ///
    /// A trailing `*` matches any suffix; without one the pattern is an exact key.
    async fn remove_by_pattern(&self, pattern: &str) -> Result<usize, CacheError>;
}

/// Expiry tiers, shortest for the most write-sensitive entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub search: Duration,
    pub entity: Duration,
    pub list: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            search: Duration::from_secs(5 * 60),
            entity: Duration::from_secs(15 * 60),
            list: Duration::from_secs(30 * 60),
        }
    }
}
