//! Redis connector
//!
//! Uses `redis::aio::ConnectionManager` for an async multiplexed connection
//! with automatic reconnection. Handles are cheap to clone; callers clone the
//! borrowed manager to issue commands.

use redis::aio::ConnectionManager;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::fmt;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use uuid::Uuid;

use super::{BackendKind, ConnectionConfig};
use crate::error::ConnectError;

pub const DEFAULT_SCHEME: &str = "tcp";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;

/// Redis connection backed by a connection manager
pub struct RedisConnector {
    name: String,
    config: ConnectionConfig,
    instance_id: Uuid,
    manager: RwLock<Option<ConnectionManager>>,
}

impl RedisConnector {
    pub fn new(config: ConnectionConfig, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config,
            instance_id: Uuid::new_v4(),
            manager: RwLock::new(None),
        }
    }

    /// Build connection parameters from the configuration, applying defaults
    pub fn connection_info(&self) -> Result<ConnectionInfo, ConnectError> {
        let scheme = self.config.str_or(&["scheme"], DEFAULT_SCHEME);
        if !scheme.eq_ignore_ascii_case("tcp") {
            return Err(ConnectError::new(
                BackendKind::Redis,
                format!("unsupported scheme \"{}\"", scheme),
            ));
        }

        let host = self.config.str_or(&["host"], DEFAULT_HOST);
        let port = self.config.get_u16("port").unwrap_or(DEFAULT_PORT);

        Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                db: self.config.get_i64("database").unwrap_or(0),
                username: self.config.get_str("username").filter(|u| !u.is_empty()),
                password: self.config.get_str("password").filter(|p| !p.is_empty()),
                ..Default::default()
            },
        })
    }

    /// Connect timeout from the `timeout` key, in (fractional) seconds
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.config
            .get_f64("timeout")
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Borrow the native connection manager. `None` while unconnected.
    pub async fn handle(&self) -> Option<RwLockReadGuard<'_, ConnectionManager>> {
        RwLockReadGuard::try_map(self.manager.read().await, |m| m.as_ref()).ok()
    }

    pub async fn connect(&self) -> Result<(), ConnectError> {
        let mut slot = self.manager.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let client = redis::Client::open(self.connection_info()?)
            .map_err(|e| ConnectError::new(BackendKind::Redis, e.to_string()))?;

        let connecting = ConnectionManager::new(client);
        let manager = match self.connect_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, connecting)
                .await
                .map_err(|_| {
                    ConnectError::new(
                        BackendKind::Redis,
                        format!("connect timed out after {:?}", timeout),
                    )
                })?,
            None => connecting.await,
        }
        .map_err(|e| ConnectError::new(BackendKind::Redis, e.to_string()))?;

        tracing::debug!(connection = %self.name, "Redis connection established");
        *slot = Some(manager);
        Ok(())
    }

    pub async fn is_healthy(&self) -> bool {
        let Some(mut conn) = self.manager.read().await.clone() else {
            return false;
        };

        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(pong) => pong == "PONG",
            Err(e) => {
                tracing::debug!(connection = %self.name, error = %e, "Redis health check failed");
                false
            }
        }
    }

    /// Drop the connection manager; the socket closes with the last clone
    pub async fn disconnect(&self) {
        self.manager.write().await.take();
    }

    pub async fn is_connected(&self) -> bool {
        self.manager.read().await.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }
}

impl fmt::Debug for RedisConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConnector")
            .field("name", &self.name)
            .field("instance_id", &self.instance_id)
            .field("config", &self.config.redacted())
            .finish()
    }
}
