//! Backend connectors
//!
//! Every supported backend is one variant of the closed [`Connector`] enum.
//! Each variant owns exactly one native client handle, created by an explicit
//! `connect()` and released by `disconnect()`:
//!
//! - MySQL and PostgreSQL through `sqlx` pools
//! - SQL Server through a `tiberius` client
//! - Redis through a `redis` connection manager
//! - DynamoDB through the AWS SDK client
//!
//! Native handles are lent out through `handle()` guards; callers never own
//! or close them.

pub mod config;
pub mod dynamodb;
pub mod mysql;
pub mod postgres;
pub mod redis;
pub mod sqlserver;

pub use config::ConnectionConfig;
pub use dynamodb::{ActivePolling, DynamoDbConnector, TableLayout};
pub use mysql::MySqlConnector;
pub use postgres::PostgresConnector;
pub use redis::RedisConnector;
pub use sqlserver::SqlServerConnector;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ConnectError;

// ============================================================================
// Backend Kind
// ============================================================================

/// Driver aliases accepted by [`BackendKind::from_driver`], in table order
pub const SUPPORTED_DRIVERS: &[&str] = &[
    "mysql",
    "pdo_mysql",
    "postgres",
    "postgresql",
    "pgsql",
    "pdo_pgsql",
    "sqlserver",
    "mssql",
    "sqlsrv",
    "pdo_sqlsrv",
    "redis",
    "dynamodb",
];

/// Broad category of a backend technology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendFamily {
    RelationalSql,
    KeyValue,
    ManagedNoSql,
}

/// Concrete backend technology behind a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    MySql,
    PostgreSql,
    SqlServer,
    Redis,
    DynamoDb,
}

impl BackendKind {
    /// Resolve a driver alias (case-insensitive)
    pub fn from_driver(driver: &str) -> Option<Self> {
        match driver.trim().to_lowercase().as_str() {
            "mysql" | "pdo_mysql" => Some(BackendKind::MySql),
            "postgres" | "postgresql" | "pgsql" | "pdo_pgsql" => Some(BackendKind::PostgreSql),
            "sqlserver" | "mssql" | "sqlsrv" | "pdo_sqlsrv" => Some(BackendKind::SqlServer),
            "redis" => Some(BackendKind::Redis),
            "dynamodb" => Some(BackendKind::DynamoDb),
            _ => None,
        }
    }

    pub fn family(&self) -> BackendFamily {
        match self {
            BackendKind::MySql | BackendKind::PostgreSql | BackendKind::SqlServer => {
                BackendFamily::RelationalSql
            }
            BackendKind::Redis => BackendFamily::KeyValue,
            BackendKind::DynamoDb => BackendFamily::ManagedNoSql,
        }
    }

    /// Canonical lowercase identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::MySql => "mysql",
            BackendKind::PostgreSql => "postgres",
            BackendKind::SqlServer => "sqlserver",
            BackendKind::Redis => "redis",
            BackendKind::DynamoDb => "dynamodb",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ============================================================================
// Connection Trait
// ============================================================================

/// Uniform lifecycle contract for a pooled connection
///
/// Implemented by [`Connector`]; the connection manager is written against
/// this trait so other connector sets can be pooled the same way.
#[async_trait]
pub trait DatabaseConnection: Send + Sync + 'static {
    /// Establish the native client. Calling it when connected is a no-op.
    async fn connect(&self) -> Result<(), ConnectError>;

    /// Backend liveness check. Never errors; any failure reads as `false`.
    async fn is_healthy(&self) -> bool;

    /// Release the native client. Safe to call when already disconnected.
    async fn disconnect(&self);

    /// Whether a native client is currently held
    async fn is_connected(&self) -> bool;

    fn kind(&self) -> BackendKind;

    /// Logical connection name this instance was built for
    fn name(&self) -> &str;

    /// Unique identity of this instance
    fn instance_id(&self) -> Uuid;

    /// [`connect`](Self::connect) that gives up once `token` fires
    async fn connect_cancellable(&self, token: &CancellationToken) -> Result<(), ConnectError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ConnectError::new(self.kind(), "connect cancelled")),
            result = self.connect() => result,
        }
    }

    /// [`is_healthy`](Self::is_healthy) that reads as unhealthy once `token` fires
    async fn is_healthy_cancellable(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            healthy = self.is_healthy() => healthy,
        }
    }
}

// ============================================================================
// Connector
// ============================================================================

/// One backend binding behind the uniform lifecycle contract
#[derive(Debug)]
pub enum Connector {
    MySql(MySqlConnector),
    PostgreSql(PostgresConnector),
    SqlServer(SqlServerConnector),
    Redis(RedisConnector),
    DynamoDb(DynamoDbConnector),
}

impl Connector {
    pub fn family(&self) -> BackendFamily {
        DatabaseConnection::kind(self).family()
    }

    pub fn as_mysql(&self) -> Option<&MySqlConnector> {
        match self {
            Connector::MySql(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_postgres(&self) -> Option<&PostgresConnector> {
        match self {
            Connector::PostgreSql(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_sqlserver(&self) -> Option<&SqlServerConnector> {
        match self {
            Connector::SqlServer(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_redis(&self) -> Option<&RedisConnector> {
        match self {
            Connector::Redis(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_dynamodb(&self) -> Option<&DynamoDbConnector> {
        match self {
            Connector::DynamoDb(c) => Some(c),
            _ => None,
        }
    }
}

#[async_trait]
impl DatabaseConnection for Connector {
    async fn connect(&self) -> Result<(), ConnectError> {
        match self {
            Connector::MySql(c) => c.connect().await,
            Connector::PostgreSql(c) => c.connect().await,
            Connector::SqlServer(c) => c.connect().await,
            Connector::Redis(c) => c.connect().await,
            Connector::DynamoDb(c) => c.connect().await,
        }
    }

    async fn is_healthy(&self) -> bool {
        match self {
            Connector::MySql(c) => c.is_healthy().await,
            Connector::PostgreSql(c) => c.is_healthy().await,
            Connector::SqlServer(c) => c.is_healthy().await,
            Connector::Redis(c) => c.is_healthy().await,
            Connector::DynamoDb(c) => c.is_healthy().await,
        }
    }

    async fn disconnect(&self) {
        match self {
            Connector::MySql(c) => c.disconnect().await,
            Connector::PostgreSql(c) => c.disconnect().await,
            Connector::SqlServer(c) => c.disconnect().await,
            Connector::Redis(c) => c.disconnect().await,
            Connector::DynamoDb(c) => c.disconnect().await,
        }
    }

    async fn is_connected(&self) -> bool {
        match self {
            Connector::MySql(c) => c.is_connected().await,
            Connector::PostgreSql(c) => c.is_connected().await,
            Connector::SqlServer(c) => c.is_connected().await,
            Connector::Redis(c) => c.is_connected().await,
            Connector::DynamoDb(c) => c.is_connected().await,
        }
    }

    fn kind(&self) -> BackendKind {
        match self {
            Connector::MySql(_) => BackendKind::MySql,
            Connector::PostgreSql(_) => BackendKind::PostgreSql,
            Connector::SqlServer(_) => BackendKind::SqlServer,
            Connector::Redis(_) => BackendKind::Redis,
            Connector::DynamoDb(_) => BackendKind::DynamoDb,
        }
    }

    fn name(&self) -> &str {
        match self {
            Connector::MySql(c) => c.name(),
            Connector::PostgreSql(c) => c.name(),
            Connector::SqlServer(c) => c.name(),
            Connector::Redis(c) => c.name(),
            Connector::DynamoDb(c) => c.name(),
        }
    }

    fn instance_id(&self) -> Uuid {
        match self {
            Connector::MySql(c) => c.instance_id(),
            Connector::PostgreSql(c) => c.instance_id(),
            Connector::SqlServer(c) => c.instance_id(),
            Connector::Redis(c) => c.instance_id(),
            Connector::DynamoDb(c) => c.instance_id(),
        }
    }
}
