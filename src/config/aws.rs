//! AWS SDK configuration
//!
//! Builds SDK clients for Secrets Manager (from [`Settings`]) and DynamoDB
//! (from a connection's [`ConnectionConfig`]), supporting static credentials
//! and custom endpoints for local development and testing.

use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::Client as DynamoDbSdkClient;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;

use crate::config::Settings;
use crate::connectors::ConnectionConfig;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Provider name attached to static credentials
const STATIC_CREDENTIALS_PROVIDER: &str = "connection-config";

/// AWS configuration builder
///
/// Creates AWS SDK configuration with support for:
/// - Custom regions
/// - Static credentials, or the default credential chain when absent
/// - Custom endpoint URLs for local testing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfigBuilder {
    region: String,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    endpoint_url: Option<String>,
}

impl AwsConfigBuilder {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: None,
        }
    }

    /// Secrets Manager settings of the application
    pub fn from_settings(settings: &Settings) -> Self {
        let mut builder = Self::new(settings.aws_region.clone());
        if let (Some(key), Some(secret)) =
            (&settings.aws_access_key_id, &settings.aws_secret_access_key)
        {
            builder = builder.with_credentials(key.clone(), secret.clone());
        }
        if let Some(endpoint) = &settings.secrets_manager_endpoint_url {
            builder = builder.with_endpoint(endpoint.clone());
        }
        builder
    }

    /// DynamoDB settings of one connection: `region`, `endpoint`, `key`, `secret`
    pub fn from_connection_config(config: &ConnectionConfig) -> Self {
        let mut builder = Self::new(config.str_or(&["region"], DEFAULT_REGION));
        let non_empty = |key: &str| config.get_str(key).filter(|v| !v.is_empty());

        if let (Some(key), Some(secret)) = (non_empty("key"), non_empty("secret")) {
            builder = builder.with_credentials(key, secret);
        }
        if let Some(endpoint) = non_empty("endpoint") {
            builder = builder.with_endpoint(endpoint);
        }
        builder
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn endpoint_url(&self) -> Option<&str> {
        self.endpoint_url.as_deref()
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }

    /// Build the base AWS SDK configuration
    pub async fn build_sdk_config(&self) -> SdkConfig {
        let region_provider =
            RegionProviderChain::first_try(Region::new(self.region.clone())).or_default_provider();

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

        if let (Some(key), Some(secret)) = (&self.access_key_id, &self.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                STATIC_CREDENTIALS_PROVIDER,
            ));
        }

        loader.load().await
    }

    /// Create a DynamoDB client with optional custom endpoint
    pub async fn build_dynamodb_client(&self) -> DynamoDbSdkClient {
        let sdk_config = self.build_sdk_config().await;

        if let Some(endpoint_url) = &self.endpoint_url {
            tracing::info!(endpoint = %endpoint_url, "Using custom DynamoDB endpoint");

            let dynamodb_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint_url)
                .build();

            DynamoDbSdkClient::from_conf(dynamodb_config)
        } else {
            DynamoDbSdkClient::new(&sdk_config)
        }
    }

    /// Create a Secrets Manager client with optional custom endpoint
    pub async fn build_secrets_manager_client(&self) -> SecretsManagerClient {
        let sdk_config = self.build_sdk_config().await;

        if let Some(endpoint_url) = &self.endpoint_url {
            tracing::info!(endpoint = %endpoint_url, "Using custom Secrets Manager endpoint");

            let secrets_config = aws_sdk_secretsmanager::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint_url)
                .build();

            SecretsManagerClient::from_conf(secrets_config)
        } else {
            SecretsManagerClient::new(&sdk_config)
        }
    }
}

/// Create a Secrets Manager client from settings (convenience function)
pub async fn create_secrets_manager_client(settings: &Settings) -> SecretsManagerClient {
    AwsConfigBuilder::from_settings(settings)
        .build_secrets_manager_client()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_connection_config_defaults() {
        let builder = AwsConfigBuilder::from_connection_config(&ConnectionConfig::new());
        assert_eq!(builder.region(), DEFAULT_REGION);
        assert_eq!(builder.endpoint_url(), None);
        assert!(!builder.has_static_credentials());
    }

    #[test]
    fn test_from_connection_config_values() {
        let config = ConnectionConfig::new()
            .with("region", "eu-central-1")
            .with("endpoint", "http://localhost:8000")
            .with("key", "AKIDLOCAL")
            .with("secret", "local-secret");

        let builder = AwsConfigBuilder::from_connection_config(&config);
        assert_eq!(builder.region(), "eu-central-1");
        assert_eq!(builder.endpoint_url(), Some("http://localhost:8000"));
        assert!(builder.has_static_credentials());
    }

    #[test]
    fn test_key_without_secret_uses_default_chain() {
        let config = ConnectionConfig::new().with("key", "AKIDLOCAL").with("endpoint", "");
        let builder = AwsConfigBuilder::from_connection_config(&config);
        assert!(!builder.has_static_credentials());
        assert_eq!(builder.endpoint_url(), None);
    }

    #[test]
    fn test_from_settings() {
        let mut settings = Settings::default();
        settings.aws_region = "ap-southeast-2".to_string();
        settings.secrets_manager_endpoint_url = Some("http://localhost:4566".to_string());

        let builder = AwsConfigBuilder::from_settings(&settings);
        assert_eq!(builder.region(), "ap-southeast-2");
        assert_eq!(builder.endpoint_url(), Some("http://localhost:4566"));
    }

    #[tokio::test]
    async fn test_build_sdk_config() {
        let config = AwsConfigBuilder::new("us-west-2")
            .with_credentials("AKIDLOCAL", "local-secret")
            .build_sdk_config()
            .await;

        assert_eq!(config.region().map(|r| r.as_ref()), Some("us-west-2"));
    }

    #[tokio::test]
    async fn test_custom_endpoint_clients() {
        let builder = AwsConfigBuilder::new(DEFAULT_REGION)
            .with_credentials("AKIDLOCAL", "local-secret")
            .with_endpoint("http://localhost:4566");

        let _dynamodb = builder.build_dynamodb_client().await;
        let _secrets = builder.build_secrets_manager_client().await;
    }
}
