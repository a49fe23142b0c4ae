//! Secret resolution
//!
//! Looks a connection configuration up in the [`SecretCache`] first, then
//! in the remote [`SecretStore`] (AWS Secrets Manager in production),
//! caching what it fetched.

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::cache::SecretCache;
use crate::connectors::ConnectionConfig;
use crate::error::SecretError;
use crate::utils::{with_timeout, TimeoutError};

/// Remote source of secret payloads
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Raw secret string for `name`; `Err` carries a human-readable reason
    async fn fetch(&self, name: &str) -> Result<String, String>;
}

/// AWS Secrets Manager backed [`SecretStore`]
#[derive(Debug, Clone)]
pub struct AwsSecretStore {
    client: SecretsManagerClient,
}

impl AwsSecretStore {
    pub fn new(client: SecretsManagerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn fetch(&self, name: &str) -> Result<String, String> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                error!(
                    secret_name = %name,
                    error = %service_error,
                    "AWS Secrets Manager error"
                );
                service_error.to_string()
            })?;

        output
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| format!("Secret \"{}\" does not contain a SecretString", name))
    }
}

/// Resolves connection configurations from the secret store
#[derive(Clone)]
pub struct SecretResolver {
    store: Option<Arc<dyn SecretStore>>,
    cache: SecretCache,
    fetch_timeout: Duration,
}

impl fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretResolver")
            .field("enabled", &self.is_enabled())
            .field("cache", &self.cache)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl SecretResolver {
    /// Resolver that fetches from `store`
    pub fn new(store: Arc<dyn SecretStore>, cache: SecretCache) -> Self {
        Self {
            store: Some(store),
            cache,
            fetch_timeout: Duration::from_secs(5),
        }
    }

    /// Resolver that only serves what is already cached
    pub fn disabled(cache: SecretCache) -> Self {
        Self {
            store: None,
            cache,
            fetch_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn cache(&self) -> &SecretCache {
        &self.cache
    }

    /// Cached configuration, else fetch, parse and cache it
    pub async fn get_secret(&self, name: &str) -> Result<ConnectionConfig, SecretError> {
        if let Some(config) = self.cache.get(name).await {
            info!(secret_name = %name, "Secret retrieved from cache");
            return Ok(config);
        }

        let Some(store) = &self.store else {
            return Err(SecretError::Disabled);
        };

        info!(secret_name = %name, "Fetching secret from store");

        let payload = with_timeout(self.fetch_timeout, store.fetch(name))
            .await
            .map_err(|e| match e {
                TimeoutError::Timeout(timeout) => {
                    SecretError::retrieval(name, format!("timed out after {:?}", timeout))
                }
                TimeoutError::Inner(message) => SecretError::retrieval(name, message),
            })?;

        let config = ConnectionConfig::from_json(&payload).map_err(|e| {
            SecretError::retrieval(name, format!("failed to decode secret: {}", e))
        })?;

        self.cache.set(name, &config, None).await;

        info!(secret_name = %name, "Secret retrieved successfully from store");

        Ok(config)
    }

    /// Drop the cached entry and resolve again
    pub async fn refresh_secret(&self, name: &str) -> Result<ConnectionConfig, SecretError> {
        self.cache.delete(name).await;
        self.get_secret(name).await
    }
}
