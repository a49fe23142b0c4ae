//! PostgreSQL connector
//!
//! Wraps a `sqlx` PostgreSQL pool created on `connect()`. TLS is selected
//! with the `sslmode` key (`disable`, `allow`, `prefer`, `require`,
//! `verify-ca`, `verify-full`).

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::fmt;
use tokio::sync::{RwLock, RwLockReadGuard};
use uuid::Uuid;

use super::{BackendKind, ConnectionConfig};
use crate::error::ConnectError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// PostgreSQL connection backed by a `sqlx` pool
pub struct PostgresConnector {
    name: String,
    config: ConnectionConfig,
    instance_id: Uuid,
    pool: RwLock<Option<PgPool>>,
}

impl PostgresConnector {
    pub fn new(config: ConnectionConfig, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config,
            instance_id: Uuid::new_v4(),
            pool: RwLock::new(None),
        }
    }

    /// Build driver options from the configuration, applying defaults
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConnectError> {
        let mut options = PgConnectOptions::new()
            .host(&self.config.str_or(&["host"], DEFAULT_HOST))
            .port(self.config.get_u16("port").unwrap_or(DEFAULT_PORT))
            .username(&self.config.str_or(&["user", "username"], DEFAULT_USER))
            .password(&self.config.str_or(&["password"], ""));

        let database = self.config.str_or(&["database", "dbname"], "");
        if !database.is_empty() {
            options = options.database(&database);
        }

        if let Some(mode) = self.config.get_str("sslmode") {
            let ssl_mode: PgSslMode = mode.parse().map_err(|_| {
                ConnectError::new(
                    BackendKind::PostgreSql,
                    format!("invalid sslmode \"{}\"", mode),
                )
            })?;
            options = options.ssl_mode(ssl_mode);
        }

        Ok(options)
    }

    /// Borrow the native pool. `None` while unconnected.
    pub async fn handle(&self) -> Option<RwLockReadGuard<'_, PgPool>> {
        RwLockReadGuard::try_map(self.pool.read().await, |pool| pool.as_ref()).ok()
    }

    pub async fn connect(&self) -> Result<(), ConnectError> {
        let mut slot = self.pool.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let options = self.connect_options()?;
        let max_connections = self
            .config
            .get_u32("max_connections")
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| ConnectError::new(BackendKind::PostgreSql, e.to_string()))?;

        tracing::debug!(connection = %self.name, "PostgreSQL pool established");
        *slot = Some(pool);
        Ok(())
    }

    pub async fn is_healthy(&self) -> bool {
        let Some(pool) = self.pool.read().await.clone() else {
            return false;
        };

        match sqlx::query("SELECT 1").execute(&pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(connection = %self.name, error = %e, "PostgreSQL health check failed");
                false
            }
        }
    }

    pub async fn disconnect(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.pool.read().await.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }
}

impl fmt::Debug for PostgresConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnector")
            .field("name", &self.name)
            .field("instance_id", &self.instance_id)
            .field("config", &self.config.redacted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let connector = PostgresConnector::new(ConnectionConfig::new(), "postgres_books");
        let options = connector.connect_options().unwrap();
        assert_eq!(options.get_host(), DEFAULT_HOST);
        assert_eq!(options.get_port(), DEFAULT_PORT);
        assert_eq!(options.get_username(), DEFAULT_USER);
        assert_eq!(options.get_database(), None);
    }

    #[test]
    fn test_configured_values() {
        let config = ConnectionConfig::new()
            .with("host", "db")
            .with("database", "books")
            .with("user", "librarian")
            .with("port", 6432);
        let options = PostgresConnector::new(config, "books").connect_options().unwrap();

        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_username(), "librarian");
        assert_eq!(options.get_database(), Some("books"));
    }

    #[test]
    fn test_sslmode() {
        let config = ConnectionConfig::new().with("sslmode", "require");
        let options = PostgresConnector::new(config, "books").connect_options().unwrap();
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Require));

        let config = ConnectionConfig::new().with("sslmode", "sometimes");
        let err = PostgresConnector::new(config, "books")
            .connect_options()
            .unwrap_err();
        assert_eq!(err.backend, BackendKind::PostgreSql);
    }

    #[tokio::test]
    async fn test_invalid_sslmode_fails_connect_without_io() {
        let config = ConnectionConfig::new().with("sslmode", "sometimes");
        let connector = PostgresConnector::new(config, "books");
        assert!(connector.connect().await.is_err());
        assert!(!connector.is_connected().await);
    }
}
