//! DynamoDB connector
//!
//! Wraps the AWS SDK DynamoDB client. Supports a custom endpoint for
//! DynamoDB Local / LocalStack and static credentials from the connection
//! configuration, falling back to the default credential chain.
//!
//! When a `table` is configured, the first successful `connect()` makes sure
//! the table exists, creating it (with an optional global secondary index)
//! and waiting until it is `ACTIVE`. The wait is `poll_attempts` polls
//! `poll_interval_ms` apart; the defaults stay inside the manager's default
//! connect timeout. A table found in any other state is waited on too.

use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType,
    Projection, ProjectionType, ScalarAttributeType, TableStatus,
};
use aws_sdk_dynamodb::Client as DynamoDbSdkClient;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use uuid::Uuid;

use super::{BackendKind, ConnectionConfig};
use crate::config::AwsConfigBuilder;
use crate::error::ConnectError;

pub const DEFAULT_PARTITION_KEY: &str = "id";

/// `DescribeTable` polls while waiting for `ACTIVE`
pub const DEFAULT_POLL_ATTEMPTS: u32 = 9;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Table layout to provision on first connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub table_name: String,
    pub partition_key: String,
    /// Global secondary index as `(index_name, hash_key)`
    pub index: Option<(String, String)>,
}

impl TableLayout {
    /// Read the table layout from `table`, `partition_key`, `index_name`
    /// and `index_key`. `None` when no table is configured.
    pub fn from_config(config: &ConnectionConfig) -> Option<Self> {
        let table_name = config.get_str("table").filter(|t| !t.is_empty())?;
        let index = match (config.get_str("index_name"), config.get_str("index_key")) {
            (Some(name), Some(key)) if !name.is_empty() && !key.is_empty() => Some((name, key)),
            _ => None,
        };

        Some(Self {
            table_name,
            partition_key: config.str_or(&["partition_key"], DEFAULT_PARTITION_KEY),
            index,
        })
    }
}

/// How long `connect()` waits for a table to become `ACTIVE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivePolling {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for ActivePolling {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

impl ActivePolling {
    /// Read `poll_interval_ms` and `poll_attempts`, keeping defaults for
    /// missing or zero values
    pub fn from_config(config: &ConnectionConfig) -> Self {
        let defaults = Self::default();
        Self {
            interval: config
                .get_u64("poll_interval_ms")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            attempts: config
                .get_u32("poll_attempts")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.attempts),
        }
    }

    /// Longest time spent sleeping between polls
    pub fn budget(&self) -> Duration {
        self.interval * self.attempts
    }
}

/// DynamoDB connection backed by the AWS SDK client
pub struct DynamoDbConnector {
    name: String,
    config: ConnectionConfig,
    instance_id: Uuid,
    client: RwLock<Option<DynamoDbSdkClient>>,
    provisioned: AtomicBool,
}

impl DynamoDbConnector {
    pub fn new(config: ConnectionConfig, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config,
            instance_id: Uuid::new_v4(),
            client: RwLock::new(None),
            provisioned: AtomicBool::new(false),
        }
    }

    pub fn table_layout(&self) -> Option<TableLayout> {
        TableLayout::from_config(&self.config)
    }

    /// Borrow the native client. `None` while unconnected.
    pub async fn handle(&self) -> Option<RwLockReadGuard<'_, DynamoDbSdkClient>> {
        RwLockReadGuard::try_map(self.client.read().await, |c| c.as_ref()).ok()
    }

    pub async fn connect(&self) -> Result<(), ConnectError> {
        let mut slot = self.client.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let client = AwsConfigBuilder::from_connection_config(&self.config)
            .build_dynamodb_client()
            .await;

        if !self.provisioned.load(Ordering::SeqCst) {
            if let Some(layout) = self.table_layout() {
                let polling = ActivePolling::from_config(&self.config);
                ensure_table(&client, &layout, polling).await?;
            }
            self.provisioned.store(true, Ordering::SeqCst);
        }

        *slot = Some(client);
        Ok(())
    }

    /// Performs a `ListTables(limit=1)` call to verify connectivity
    pub async fn is_healthy(&self) -> bool {
        let Some(client) = self.client.read().await.clone() else {
            return false;
        };

        match client.list_tables().limit(1).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(connection = %self.name, error = %e, "DynamoDB health check failed");
                false
            }
        }
    }

    /// The SDK client holds no session; dropping it is enough
    pub async fn disconnect(&self) {
        self.client.write().await.take();
    }

    pub async fn is_connected(&self) -> bool {
        self.client.read().await.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }
}

impl fmt::Debug for DynamoDbConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoDbConnector")
            .field("name", &self.name)
            .field("instance_id", &self.instance_id)
            .field("config", &self.config.redacted())
            .finish()
    }
}

// ============================================================================
// Table Provisioning
// ============================================================================

fn provisioning_error(message: impl fmt::Display) -> ConnectError {
    ConnectError::new(BackendKind::DynamoDb, message.to_string())
}

/// Create the table when missing and wait until it is `ACTIVE`. Returns
/// `true` if it was created.
async fn ensure_table(
    client: &DynamoDbSdkClient,
    layout: &TableLayout,
    polling: ActivePolling,
) -> Result<bool, ConnectError> {
    match client.describe_table().table_name(&layout.table_name).send().await {
        Ok(output) => {
            let status = output.table().and_then(|t| t.table_status());
            if matches!(status, Some(TableStatus::Active)) {
                return Ok(false);
            }

            tracing::info!(
                table = %layout.table_name,
                status = ?status,
                "DynamoDB table not active yet, waiting"
            );
            wait_until_active(client, &layout.table_name, polling).await?;
            return Ok(false);
        }
        Err(e) => {
            let service_error = e.into_service_error();
            if !service_error.is_resource_not_found_exception() {
                return Err(provisioning_error(service_error));
            }
        }
    }

    tracing::info!(table = %layout.table_name, "DynamoDB table missing, creating");
    create_table(client, layout).await?;
    wait_until_active(client, &layout.table_name, polling).await?;
    tracing::info!(table = %layout.table_name, "DynamoDB table active");

    Ok(true)
}

async fn create_table(client: &DynamoDbSdkClient, layout: &TableLayout) -> Result<(), ConnectError> {
    let mut request = client
        .create_table()
        .table_name(&layout.table_name)
        .attribute_definitions(string_attribute(&layout.partition_key)?)
        .key_schema(hash_key(&layout.partition_key)?)
        .billing_mode(BillingMode::PayPerRequest);

    if let Some((index_name, index_key)) = &layout.index {
        if index_key != &layout.partition_key {
            request = request.attribute_definitions(string_attribute(index_key)?);
        }

        let index = GlobalSecondaryIndex::builder()
            .index_name(index_name)
            .key_schema(hash_key(index_key)?)
            .projection(
                Projection::builder()
                    .projection_type(ProjectionType::All)
                    .build(),
            )
            .build()
            .map_err(provisioning_error)?;

        request = request.global_secondary_indexes(index);
    }

    request.send().await.map_err(provisioning_error)?;
    Ok(())
}

async fn wait_until_active(
    client: &DynamoDbSdkClient,
    table_name: &str,
    polling: ActivePolling,
) -> Result<(), ConnectError> {
    for _ in 0..polling.attempts {
        let output = client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(provisioning_error)?;

        let status = output.table().and_then(|t| t.table_status());
        if matches!(status, Some(TableStatus::Active)) {
            return Ok(());
        }

        tokio::time::sleep(polling.interval).await;
    }

    Err(provisioning_error(format!(
        "table \"{}\" did not become ACTIVE within {:?}",
        table_name,
        polling.budget()
    )))
}

fn string_attribute(name: &str) -> Result<AttributeDefinition, ConnectError> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(provisioning_error)
}

fn hash_key(name: &str) -> Result<KeySchemaElement, ConnectError> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(KeyType::Hash)
        .build()
        .map_err(provisioning_error)
}
