//! TTL cache of resolved connection configurations
//!
//! Entries live under `"secret:" + name` in a [`CacheStore`]. The cache is
//! best effort: store failures and malformed payloads are logged and read as
//! misses, writes never fail the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::store::{CacheStore, MemoryCacheStore};
use crate::connectors::ConnectionConfig;

pub const CACHE_PREFIX: &str = "secret:";
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cache of secret payloads keyed by secret name
#[derive(Clone)]
pub struct SecretCache {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
}

impl fmt::Debug for SecretCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCache")
            .field("store", &self.store.provider_name())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl SecretCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            default_ttl: DEFAULT_TTL,
        }
    }

    /// In-memory cache bounded to `max_capacity` entries
    pub fn in_memory(max_capacity: u64) -> Self {
        Self::new(Arc::new(MemoryCacheStore::new(max_capacity)))
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn key(name: &str) -> String {
        format!("{}{}", CACHE_PREFIX, name)
    }

    /// Cached configuration for `name`, if present, unexpired and decodable
    pub async fn get(&self, name: &str) -> Option<ConnectionConfig> {
        let payload = match self.store.get(&Self::key(name)).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(secret_name = %name, "Secret cache MISS");
                return None;
            }
            Err(e) => {
                error!(secret_name = %name, error = %e, "Secret cache get error");
                return None;
            }
        };

        match ConnectionConfig::from_json(&payload) {
            Ok(config) => {
                debug!(secret_name = %name, "Secret cache HIT");
                Some(config)
            }
            Err(e) => {
                warn!(secret_name = %name, error = %e, "Failed to decode cached secret");
                None
            }
        }
    }

    /// Store `config` under `name` for `ttl` (the default TTL when `None`)
    pub async fn set(&self, name: &str, config: &ConnectionConfig, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);

        let payload = match config.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(secret_name = %name, error = %e, "Failed to encode secret for cache");
                return;
            }
        };

        match self.store.set(&Self::key(name), &payload, ttl).await {
            Ok(()) => debug!(secret_name = %name, ttl_seconds = ttl.as_secs(), "Secret cached"),
            Err(e) => error!(secret_name = %name, error = %e, "Secret cache set error"),
        }
    }

    pub async fn delete(&self, name: &str) {
        match self.store.delete(&Self::key(name)).await {
            Ok(()) => debug!(secret_name = %name, "Secret removed from cache"),
            Err(e) => error!(secret_name = %name, error = %e, "Secret cache delete error"),
        }
    }

    /// Remove every cached secret
    pub async fn clear(&self) {
        match self.store.delete_prefix(CACHE_PREFIX).await {
            Ok(0) => {}
            Ok(count) => info!(count, "All secrets cleared from cache"),
            Err(e) => error!(error = %e, "Secret cache clear error"),
        }
    }
}
