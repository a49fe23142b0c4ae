//! Secret resolution and caching
//!
//! Connection configurations can be kept in a remote secret store. The
//! [`SecretResolver`] fetches them and keeps each payload in a
//! [`SecretCache`] for an hour by default.

pub mod cache;
pub mod resolver;
pub mod store;

pub use cache::{SecretCache, CACHE_PREFIX, DEFAULT_TTL};
pub use resolver::{AwsSecretStore, SecretResolver, SecretStore};
pub use store::{CacheStore, MemoryCacheStore, NoOpCacheStore, RedisCacheStore};
