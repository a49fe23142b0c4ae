//! Key-value stores backing the secret cache
//!
//! - [`MemoryCacheStore`]: in-process moka cache with per-entry TTL
//! - [`RedisCacheStore`]: shared Redis instance via `ConnectionManager`
//! - [`NoOpCacheStore`]: caching disabled, every read misses

use async_trait::async_trait;
use moka::Expiry;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// Minimal key-value contract the secret cache needs
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` on miss or expired entry
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete every key starting with `prefix`; returns the number removed
    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64>;

    fn provider_name(&self) -> &'static str;
}

// ============================================================================
// Memory Store
// ============================================================================

#[derive(Clone)]
struct CachedValue {
    value: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with
struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory store using Moka
///
/// Not shared between processes; each process resolves secrets on its own.
#[derive(Clone)]
pub struct MemoryCacheStore {
    cache: moka::future::Cache<String, CachedValue>,
}

impl fmt::Debug for MemoryCacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCacheStore")
            .field("max_capacity", &self.cache.policy().max_capacity())
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl MemoryCacheStore {
    pub fn new(max_capacity: u64) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        debug!(max_capacity, "Moka secret cache store created");

        Self { cache }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let entry = CachedValue {
            value: value.to_string(),
            ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in &keys {
            self.cache.invalidate(key).await;
        }

        Ok(keys.len() as u64)
    }

    fn provider_name(&self) -> &'static str {
        "moka"
    }
}

// ============================================================================
// Redis Store
// ============================================================================

/// Redis-backed store using ConnectionManager
///
/// Uses SCAN for prefix deletion to avoid blocking the server.
#[derive(Clone)]
pub struct RedisCacheStore {
    connection_manager: redis::aio::ConnectionManager,
}

impl fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCacheStore")
            .field("connection_manager", &"ConnectionManager")
            .finish()
    }
}

impl RedisCacheStore {
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::Backend(format!("Failed to create Redis client: {}", e)))?;

        let connection_manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to connect to Redis: {}", e)))?;

        debug!(url = %redact_url(url), "Redis secret cache store connected");

        Ok(Self { connection_manager })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection_manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Redis GET failed: {}", e)))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();
        let ttl_seconds = ttl.as_secs().max(1);

        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Redis SETEX failed: {}", e)))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();

        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Redis DEL failed: {}", e)))
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let mut conn = self.connection_manager.clone();
        let pattern = format!("{}*", prefix);
        let mut deleted: u64 = 0;
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::Backend(format!("Redis SCAN failed: {}", e)))?;

            if !keys.is_empty() {
                let count: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| CacheError::Backend(format!("Redis DEL (batch) failed: {}", e)))?;
                deleted += count;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}

/// Redact the password of a Redis URL for logging
fn redact_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            return format!("{}***{}", &url[..=colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}

// ============================================================================
// No-op Store
// ============================================================================

/// Store used when caching is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCacheStore;

#[async_trait]
impl CacheStore for NoOpCacheStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Ok(())
    }

    async fn delete_prefix(&self, _prefix: &str) -> CacheResult<u64> {
        Ok(0)
    }

    fn provider_name(&self) -> &'static str {
        "noop"
    }
}
