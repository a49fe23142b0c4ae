//! Configuration management module
//!
//! This module handles loading and validating application configuration
//! from environment variables, .env files and local connection files.

pub mod aws;
pub mod connections;
pub mod settings;

pub use aws::{create_secrets_manager_client, AwsConfigBuilder};
pub use connections::{load_local_connections, load_local_connections_from};
pub use settings::{Environment, SecretCacheBackend, SecretCacheSettings, Settings};
