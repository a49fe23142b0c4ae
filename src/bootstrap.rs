//! Application wiring
//!
//! Builds the secret cache, resolver and [`ConnectionManager`] described by
//! [`Settings`], and registers the local fallback configurations.

use anyhow::Result;
use std::sync::Arc;

use crate::config::{
    create_secrets_manager_client, load_local_connections, SecretCacheBackend, Settings,
};
use crate::manager::ConnectionManager;
use crate::secrets::{
    AwsSecretStore, NoOpCacheStore, RedisCacheStore, SecretCache, SecretResolver,
};

/// Secret cache over the configured store
///
/// An unreachable Redis falls back to the in-memory store.
pub async fn build_secret_cache(settings: &Settings) -> SecretCache {
    let cache_settings = &settings.secret_cache;

    let cache = match cache_settings.backend {
        SecretCacheBackend::Memory => SecretCache::in_memory(cache_settings.capacity),
        SecretCacheBackend::None => SecretCache::new(Arc::new(NoOpCacheStore)),
        SecretCacheBackend::Redis => match RedisCacheStore::connect(&cache_settings.redis_url).await {
            Ok(store) => SecretCache::new(Arc::new(store)),
            Err(e) => {
                tracing::warn!(error = %e, "Redis secret cache unavailable, using in-memory cache");
                SecretCache::in_memory(cache_settings.capacity)
            }
        },
    };

    cache.with_default_ttl(cache_settings.ttl())
}

/// Secret resolver backed by AWS Secrets Manager when `USE_AWS_SECRETS` is set
pub async fn build_secret_resolver(settings: &Settings) -> SecretResolver {
    let cache = build_secret_cache(settings).await;
    let fetch_timeout = settings.timeout_config().secret_fetch_timeout;

    if settings.use_aws_secrets {
        let client = create_secrets_manager_client(settings).await;
        SecretResolver::new(Arc::new(AwsSecretStore::new(client)), cache)
            .with_fetch_timeout(fetch_timeout)
    } else {
        SecretResolver::disabled(cache).with_fetch_timeout(fetch_timeout)
    }
}

/// Fully wired connection manager
pub async fn build_manager(settings: &Settings) -> Result<ConnectionManager> {
    let resolver = build_secret_resolver(settings).await;
    let manager =
        ConnectionManager::with_default_factory(resolver).with_timeouts(settings.timeout_config());

    let local = load_local_connections(settings.connections_file.as_deref())?;
    for (name, config) in local {
        manager.register_local_configuration(name, config);
    }

    tracing::info!(
        secrets_enabled = manager.resolver().is_enabled(),
        cache_backend = %settings.secret_cache.backend,
        local_connections = manager.registered_names().len(),
        "Connection manager ready"
    );

    Ok(manager)
}
