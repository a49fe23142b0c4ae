//! MySQL connector
//!
//! Wraps a `sqlx` MySQL pool created on `connect()`.

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::fmt;
use tokio::sync::{RwLock, RwLockReadGuard};
use uuid::Uuid;

use super::{BackendKind, ConnectionConfig};
use crate::error::ConnectError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_CHARSET: &str = "utf8mb4";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// MySQL connection backed by a `sqlx` pool
pub struct MySqlConnector {
    name: String,
    config: ConnectionConfig,
    instance_id: Uuid,
    pool: RwLock<Option<MySqlPool>>,
}

impl MySqlConnector {
    pub fn new(config: ConnectionConfig, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config,
            instance_id: Uuid::new_v4(),
            pool: RwLock::new(None),
        }
    }

    /// Build driver options from the configuration, applying defaults
    pub fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.config.str_or(&["host"], DEFAULT_HOST))
            .port(self.config.get_u16("port").unwrap_or(DEFAULT_PORT))
            .username(&self.config.str_or(&["user", "username"], DEFAULT_USER))
            .password(&self.config.str_or(&["password"], ""))
            .charset(&self.config.str_or(&["charset"], DEFAULT_CHARSET));

        let database = self.config.str_or(&["database", "dbname"], "");
        if !database.is_empty() {
            options = options.database(&database);
        }

        options
    }

    /// Borrow the native pool. `None` while unconnected.
    pub async fn handle(&self) -> Option<RwLockReadGuard<'_, MySqlPool>> {
        RwLockReadGuard::try_map(self.pool.read().await, |pool| pool.as_ref()).ok()
    }

    pub async fn connect(&self) -> Result<(), ConnectError> {
        let mut slot = self.pool.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let max_connections = self
            .config
            .get_u32("max_connections")
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(self.connect_options())
            .await
            .map_err(|e| ConnectError::new(BackendKind::MySql, e.to_string()))?;

        tracing::debug!(connection = %self.name, "MySQL pool established");
        *slot = Some(pool);
        Ok(())
    }

    pub async fn is_healthy(&self) -> bool {
        // Clone the pool handle so the health check never blocks disconnect()
        let Some(pool) = self.pool.read().await.clone() else {
            return false;
        };

        match sqlx::query("SELECT 1").execute(&pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(connection = %self.name, error = %e, "MySQL health check failed");
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

impl fmt::Debug for MySqlConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConnector")
            .field("name", &self.name)
            .field("instance_id", &self.instance_id)
            .field("config", &self.config.redacted())
            .finish()
    }
}
