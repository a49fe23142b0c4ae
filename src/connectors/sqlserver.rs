//! SQL Server connector
//!
//! Wraps a single `tiberius` client over a Tokio TCP stream. Queries need
//! exclusive access to the client, so the handle is lent out behind a mutex.

use std::fmt;
use std::time::Duration;
use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use uuid::Uuid;

use super::{BackendKind, ConnectionConfig};
use crate::error::ConnectError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 1433;
pub const DEFAULT_USER: &str = "sa";

/// How long a health check waits for a borrowed client before calling it
/// unhealthy
pub const BORROWED_CLIENT_WAIT: Duration = Duration::from_secs(1);

/// Native SQL Server client type
pub type SqlServerClient = Client<Compat<TcpStream>>;

/// SQL Server connection backed by one `tiberius` client
pub struct SqlServerConnector {
    name: String,
    config: ConnectionConfig,
    instance_id: Uuid,
    client: Mutex<Option<SqlServerClient>>,
}

impl SqlServerConnector {
    pub fn new(config: ConnectionConfig, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config,
            instance_id: Uuid::new_v4(),
            client: Mutex::new(None),
        }
    }

    /// Build the driver configuration, applying defaults
    pub fn tiberius_config(&self) -> Config {
        let mut config = Config::new();
        config.host(self.config.str_or(&["host"], DEFAULT_HOST));
        config.port(self.config.get_u16("port").unwrap_or(DEFAULT_PORT));

        let database = self.config.str_or(&["database", "dbname"], "");
        if !database.is_empty() {
            config.database(database);
        }

        config.authentication(AuthMethod::sql_server(
            self.config.str_or(&["user", "username"], DEFAULT_USER),
            self.config.str_or(&["password"], ""),
        ));

        if self.config.get_bool("trust_server_certificate").unwrap_or(false) {
            config.trust_cert();
        }

        config
    }

    /// Borrow the native client exclusively. `None` while unconnected.
    pub async fn handle(&self) -> Option<MappedMutexGuard<'_, SqlServerClient>> {
        MutexGuard::try_map(self.client.lock().await, |client| client.as_mut()).ok()
    }

    pub async fn connect(&self) -> Result<(), ConnectError> {
        let mut slot = self.client.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let config = self.tiberius_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| ConnectError::new(BackendKind::SqlServer, e.to_string()))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| ConnectError::new(BackendKind::SqlServer, e.to_string()))?;

        tracing::debug!(connection = %self.name, "SQL Server client established");
        *slot = Some(client);
        Ok(())
    }

    pub async fn is_healthy(&self) -> bool {
        let Ok(mut slot) = tokio::time::timeout(BORROWED_CLIENT_WAIT, self.client.lock()).await else {
            tracing::debug!(
                connection = %self.name,
                wait_ms = BORROWED_CLIENT_WAIT.as_millis() as u64,
                "SQL Server client still borrowed, reporting unhealthy"
            );
            return false;
        };
        let Some(client) = slot.as_mut() else {
            return false;
        };

        let check = match client.simple_query("SELECT 1").await {
            Ok(stream) => stream.into_first_result().await.map(|_| ()),
            Err(e) => Err(e),
        };

        match check {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(connection = %self.name, error = %e, "SQL Server health check failed");
                false
            }
        }
    }

    pub async fn disconnect(&self) {
        if let Some(client) = self.client.lock().await.take() {
            if let Err(e) = client.close().await {
                tracing::debug!(connection = %self.name, error = %e, "SQL Server close failed");
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }
}

impl fmt::Debug for SqlServerConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlServerConnector")
            .field("name", &self.name)
            .field("instance_id", &self.instance_id)
            .field("config", &self.config.redacted())
            .finish()
    }
}
