//! Application configuration, read from environment variables.

use crate::cache::CacheTtl;
use crate::query::PageLimits;
use figment::{Figment, providers::Env};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base level for this crate's log targets (`RUST_LOG` overrides it entirely)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Postgres connection string. When absent the service runs on the in-memory backend.
    #[serde(default)]
    pub database_url: Option<String>,
    /// TTL for cached search pages, in seconds
    #[serde(default = "default_search_ttl")]
    pub cache_search_ttl: u64,
    /// TTL for cached single-entity lookups, in seconds
    #[serde(default = "default_entity_ttl")]
    pub cache_entity_ttl: u64,
    /// TTL for cached full-list views, in seconds
    #[serde(default = "default_list_ttl")]
    pub cache_list_ttl: u64,
    #[serde(default = "default_page_size")]
    pub search_default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub search_max_page_size: u32,
    /// Grace period for in-flight requests on shutdown, in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_search_ttl() -> u64 {
    5 * 60
}

fn default_entity_ttl() -> u64 {
    15 * 60
}

fn default_list_ttl() -> u64 {
    30 * 60
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    100
}

fn default_shutdown_timeout() -> u64 {
    8
}

impl Config {
    /// Load from raw environment variables (`PORT`, `DATABASE_URL`, ...).
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_figment(Figment::new().merge(Env::raw()))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }

    pub fn cache_ttl(&self) -> CacheTtl {
        CacheTtl {
            search: Duration::from_secs(self.cache_search_ttl),
            entity: Duration::from_secs(self.cache_entity_ttl),
            list: Duration::from_secs(self.cache_list_ttl),
        }
    }

    /// Page-size bounds. A max below the default is raised to the default.
    pub fn page_limits(&self) -> PageLimits {
        let default_page_size = self.search_default_page_size.max(1);
        PageLimits {
            default_page_size,
            max_page_size: self.search_max_page_size.max(default_page_size),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}
