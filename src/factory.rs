//! Connector factory
//!
//! Maps a driver alias onto the [`Connector`] variant that serves it. The
//! factory is stateless; connectors come back unconnected.

use crate::connectors::{
    BackendKind, ConnectionConfig, Connector, DatabaseConnection, DynamoDbConnector,
    MySqlConnector, PostgresConnector, RedisConnector, SqlServerConnector, SUPPORTED_DRIVERS,
};
use crate::error::ConnectionError;

/// Builds connectors for the [`ConnectionManager`](crate::manager::ConnectionManager)
///
/// Production code uses [`ConnectionFactory`]; tests plug in in-memory
/// connectors through this trait.
pub trait ConnectorFactory: Send + Sync + 'static {
    type Connector: DatabaseConnection;

    fn create(
        &self,
        driver: &str,
        config: ConnectionConfig,
        name: &str,
    ) -> Result<Self::Connector, ConnectionError>;
}

/// Dispatches driver aliases to backend connectors
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionFactory;

impl ConnectionFactory {
    pub fn new() -> Self {
        Self
    }

    /// Create an unconnected connector for `driver` (case-insensitive alias)
    pub fn create(
        &self,
        driver: &str,
        config: ConnectionConfig,
        name: &str,
    ) -> Result<Connector, ConnectionError> {
        let kind = BackendKind::from_driver(driver).ok_or_else(|| {
            ConnectionError::UnsupportedDatabase {
                driver: driver.to_string(),
            }
        })?;

        tracing::debug!(connection = %name, driver = %driver, backend = %kind, "Creating connector");

        let connector = match kind {
            BackendKind::MySql => Connector::MySql(MySqlConnector::new(config, name)),
            BackendKind::PostgreSql => Connector::PostgreSql(PostgresConnector::new(config, name)),
            BackendKind::SqlServer => Connector::SqlServer(SqlServerConnector::new(config, name)),
            BackendKind::Redis => Connector::Redis(RedisConnector::new(config, name)),
            BackendKind::DynamoDb => Connector::DynamoDb(DynamoDbConnector::new(config, name)),
        };

        Ok(connector)
    }

    /// Every accepted driver alias
    pub fn supported_drivers(&self) -> &'static [&'static str] {
        SUPPORTED_DRIVERS
    }
}

impl ConnectorFactory for ConnectionFactory {
    type Connector = Connector;

    fn create(
        &self,
        driver: &str,
        config: ConnectionConfig,
        name: &str,
    ) -> Result<Connector, ConnectionError> {
        ConnectionFactory::create(self, driver, config, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::BackendFamily;

    #[tokio::test]
    async fn test_pgsql_alias_creates_postgres_connector() {
        let config = ConnectionConfig::new()
            .with("driver", "pgsql")
            .with("host", "db.internal");

        let connector = ConnectionFactory::new()
            .create("pgsql", config, "orders")
            .unwrap();

        assert_eq!(connector.kind(), BackendKind::PostgreSql);
        assert_eq!(connector.family(), BackendFamily::RelationalSql);
        assert_eq!(connector.name(), "orders");
        assert!(connector.as_postgres().is_some());
        assert!(!connector.is_connected().await);
    }

    #[test]
    fn test_unknown_driver_is_unsupported() {
        let err = ConnectionFactory::new()
            .create("mongo", ConnectionConfig::new(), "x")
            .unwrap_err();

        match err {
            ConnectionError::UnsupportedDatabase { driver } => assert_eq!(driver, "mongo"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_aliases_are_case_insensitive() {
        let factory = ConnectionFactory::new();
        let cases = [
            ("MySQL", BackendKind::MySql),
            ("PDO_PGSQL", BackendKind::PostgreSql),
            ("sqlsrv", BackendKind::SqlServer),
            ("Redis", BackendKind::Redis),
            ("dynamoDB", BackendKind::DynamoDb),
        ];

        for (driver, kind) in cases {
            let connector = factory.create(driver, ConnectionConfig::new(), "n").unwrap();
            assert_eq!(connector.kind(), kind, "{driver}");
        }
    }

    #[test]
    fn test_each_call_builds_a_new_instance() {
        let factory = ConnectionFactory::new();
        let a = factory.create("redis", ConnectionConfig::new(), "cache").unwrap();
        let b = factory.create("redis", ConnectionConfig::new(), "cache").unwrap();
        assert_ne!(a.instance_id(), b.instance_id());
    }

    #[test]
    fn test_supported_drivers() {
        let drivers = ConnectionFactory::new().supported_drivers();
        assert!(drivers.contains(&"pdo_mysql"));
        assert!(drivers.contains(&"dynamodb"));
        assert!(!drivers.contains(&"mongo"));
    }
}
