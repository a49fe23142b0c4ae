//! Connection hub library
//!
//! Resolves logical connection names to live, health-checked backend
//! connectors (MySQL, PostgreSQL, SQL Server, Redis, DynamoDB), reading
//! their configuration from AWS Secrets Manager or local fallbacks.

// Public modules
pub mod bootstrap;
pub mod config;
pub mod connectors;
pub mod error;
pub mod factory;
pub mod manager;
pub mod secrets;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use connectors::{BackendFamily, BackendKind, ConnectionConfig, Connector, DatabaseConnection};
pub use error::{ConnectionError, SecretError};
pub use factory::{ConnectionFactory, ConnectorFactory};
pub use manager::ConnectionManager;
pub use secrets::{SecretCache, SecretResolver};
