//! Application settings and configuration
//!
//! This module provides configuration management for the application,
//! loading settings from environment variables with sensible defaults.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::TimeoutConfig;

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!("Invalid environment: {}. Expected: development, staging, or production", s),
        }
    }
}

/// Store backing the secret cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretCacheBackend {
    Memory,
    Redis,
    None,
}

impl fmt::Display for SecretCacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretCacheBackend::Memory => write!(f, "memory"),
            SecretCacheBackend::Redis => write!(f, "redis"),
            SecretCacheBackend::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for SecretCacheBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "moka" => Ok(SecretCacheBackend::Memory),
            "redis" => Ok(SecretCacheBackend::Redis),
            "none" | "disabled" => Ok(SecretCacheBackend::None),
            _ => anyhow::bail!("Invalid secret cache backend: {}. Expected: memory, redis, or none", s),
        }
    }
}

/// Secret cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecretCacheSettings {
    pub backend: SecretCacheBackend,
    #[serde(skip_serializing)]
    pub redis_url: String,
    pub ttl_seconds: u64,
    /// Entry bound of the in-memory store
    pub capacity: u64,
}

impl Default for SecretCacheSettings {
    fn default() -> Self {
        Self {
            backend: SecretCacheBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            ttl_seconds: 3600,
            capacity: 1000,
        }
    }
}

impl SecretCacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,

    // Secret resolution
    pub use_aws_secrets: bool,

    // AWS settings
    pub aws_region: String,
    #[serde(skip_serializing)]
    pub aws_access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub aws_secret_access_key: Option<String>,
    pub secrets_manager_endpoint_url: Option<String>,

    // Secret cache
    pub secret_cache: SecretCacheSettings,

    // Timeouts
    pub connect_timeout_secs: u64,
    pub health_check_timeout_secs: u64,
    pub secret_fetch_timeout_secs: u64,

    /// File holding local fallback connection configurations
    pub connections_file: Option<PathBuf>,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let settings = Self {
            // App settings
            app_name: var_or("APP_NAME", "connection-hub"),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: var_or("ENVIRONMENT", "development")
                .parse()
                .unwrap_or_default(),
            log_level: var_or("LOG_LEVEL", "info"),

            use_aws_secrets: parse_bool(&var_or("USE_AWS_SECRETS", "false")),

            // AWS settings
            aws_region: var_or("AWS_REGION", "us-east-1"),
            aws_access_key_id: non_empty("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: non_empty("AWS_SECRET_ACCESS_KEY"),
            secrets_manager_endpoint_url: non_empty("SECRETS_MANAGER_ENDPOINT_URL"),

            // Secret cache
            secret_cache: SecretCacheSettings {
                backend: var_or("SECRET_CACHE_BACKEND", "memory").parse()?,
                redis_url: var_or("SECRET_CACHE_REDIS_URL", "redis://127.0.0.1:6379"),
                ttl_seconds: var_or("SECRET_CACHE_TTL_SECONDS", "3600")
                    .parse()
                    .context("Invalid SECRET_CACHE_TTL_SECONDS value")?,
                capacity: var_or("SECRET_CACHE_CAPACITY", "1000")
                    .parse()
                    .context("Invalid SECRET_CACHE_CAPACITY value")?,
            },

            // Timeouts
            connect_timeout_secs: var_or("CONNECT_TIMEOUT_SECS", "10")
                .parse()
                .context("Invalid CONNECT_TIMEOUT_SECS value")?,
            health_check_timeout_secs: var_or("HEALTH_CHECK_TIMEOUT_SECS", "5")
                .parse()
                .context("Invalid HEALTH_CHECK_TIMEOUT_SECS value")?,
            secret_fetch_timeout_secs: var_or("SECRET_FETCH_TIMEOUT_SECS", "5")
                .parse()
                .context("Invalid SECRET_FETCH_TIMEOUT_SECS value")?,

            connections_file: non_empty("CONNECTIONS_FILE").map(PathBuf::from),
        };

        // Validate settings
        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 {
            anyhow::bail!("CONNECT_TIMEOUT_SECS must be > 0");
        }
        if self.health_check_timeout_secs == 0 {
            anyhow::bail!("HEALTH_CHECK_TIMEOUT_SECS must be > 0");
        }
        if self.secret_fetch_timeout_secs == 0 {
            anyhow::bail!("SECRET_FETCH_TIMEOUT_SECS must be > 0");
        }
        if self.secret_cache.ttl_seconds == 0 {
            anyhow::bail!("SECRET_CACHE_TTL_SECONDS must be > 0");
        }
        if self.secret_cache.backend == SecretCacheBackend::Memory && self.secret_cache.capacity == 0 {
            anyhow::bail!("SECRET_CACHE_CAPACITY must be > 0");
        }

        if self.environment == Environment::Production
            && self.use_aws_secrets
            && self.secret_cache.backend == SecretCacheBackend::None
        {
            tracing::warn!("Running in production with secret caching disabled");
        }

        Ok(())
    }

    /// Timeouts bounding connect, health-check and secret fetch calls
    pub fn timeout_config(&self) -> TimeoutConfig {
        TimeoutConfig::new()
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_health_check_timeout(Duration::from_secs(self.health_check_timeout_secs))
            .with_secret_fetch_timeout(Duration::from_secs(self.secret_fetch_timeout_secs))
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "connection-hub".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            use_aws_secrets: false,
            aws_region: "us-east-1".to_string(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            secrets_manager_endpoint_url: None,
            secret_cache: SecretCacheSettings::default(),
            connect_timeout_secs: 10,
            health_check_timeout_secs: 5,
            secret_fetch_timeout_secs: 5,
            connections_file: None,
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_from(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.app_name, "connection-hub");
        assert!(!settings.use_aws_secrets);
        assert_eq!(settings.secret_cache.backend, SecretCacheBackend::Memory);
        assert_eq!(settings.secret_cache.ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_empty_source_matches_defaults() {
        let settings = load_from(&[]).unwrap();
        assert_eq!(settings.aws_region, "us-east-1");
        assert_eq!(settings.connect_timeout_secs, 10);
        assert_eq!(settings.health_check_timeout_secs, 5);
        assert_eq!(settings.secret_cache.capacity, 1000);
        assert_eq!(settings.connections_file, None);
    }

    #[test]
    fn test_load_values() {
        let settings = load_from(&[
            ("USE_AWS_SECRETS", "true"),
            ("AWS_REGION", "eu-west-1"),
            ("AWS_ACCESS_KEY_ID", ""),
            ("SECRET_CACHE_BACKEND", "redis"),
            ("SECRET_CACHE_REDIS_URL", "redis://cache:6379/2"),
            ("SECRET_CACHE_TTL_SECONDS", "60"),
            ("CONNECT_TIMEOUT_SECS", "3"),
            ("SECRET_FETCH_TIMEOUT_SECS", "2"),
            ("CONNECTIONS_FILE", "connections.toml"),
            ("ENVIRONMENT", "prod"),
        ])
        .unwrap();

        assert!(settings.use_aws_secrets);
        assert_eq!(settings.aws_region, "eu-west-1");
        assert_eq!(settings.aws_access_key_id, None);
        assert_eq!(settings.secret_cache.backend, SecretCacheBackend::Redis);
        assert_eq!(settings.secret_cache.redis_url, "redis://cache:6379/2");
        assert_eq!(settings.secret_cache.ttl_seconds, 60);
        assert_eq!(settings.connections_file, Some(PathBuf::from("connections.toml")));
        assert!(settings.is_production());

        let timeouts = settings.timeout_config();
        assert_eq!(timeouts.connect_timeout, Duration::from_secs(3));
        assert_eq!(timeouts.health_check_timeout, Duration::from_secs(5));
        assert_eq!(timeouts.secret_fetch_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(load_from(&[("CONNECT_TIMEOUT_SECS", "0")]).is_err());
        assert!(load_from(&[("HEALTH_CHECK_TIMEOUT_SECS", "0")]).is_err());
        assert!(load_from(&[("SECRET_FETCH_TIMEOUT_SECS", "0")]).is_err());
        assert!(load_from(&[("SECRET_CACHE_TTL_SECONDS", "0")]).is_err());
        assert!(load_from(&[("SECRET_CACHE_TTL_SECONDS", "soon")]).is_err());
        assert!(load_from(&[("SECRET_CACHE_BACKEND", "memcached")]).is_err());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("development".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("maybe"));
    }
}
