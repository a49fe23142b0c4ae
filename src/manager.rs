//! Connection manager
//!
//! Registry of live connectors keyed by logical connection name. Resolves a
//! configuration (secret store first, then the local fallback map), builds
//! the connector through a [`ConnectorFactory`], connects it and pools it.
//! Pooled connectors are health checked on every lookup and rebuilt when
//! they stop answering.

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connectors::{ConnectionConfig, DatabaseConnection};
use crate::error::{ConnectionError, NotFoundReason};
use crate::factory::{ConnectionFactory, ConnectorFactory};
use crate::secrets::SecretResolver;
use crate::utils::{with_timeout, TimeoutConfig, TimeoutError};

type BuildLock = Arc<tokio::sync::Mutex<()>>;

/// Claim on a per-name build lock entry. The entry is released on drop, so a
/// caller dropped mid-build does not leave it behind.
struct BuildLockEntry<'a, F: ConnectorFactory> {
    manager: &'a ConnectionManager<F>,
    name: &'a str,
    lock: BuildLock,
}

impl<F: ConnectorFactory> Drop for BuildLockEntry<'_, F> {
    fn drop(&mut self) {
        self.manager.release_build_lock(self.name, &self.lock);
    }
}

/// Pool of live connectors with lazy, single-flight construction
pub struct ConnectionManager<F: ConnectorFactory = ConnectionFactory> {
    factory: F,
    resolver: SecretResolver,
    timeouts: TimeoutConfig,
    local_configurations: RwLock<HashMap<String, ConnectionConfig>>,
    connections: Mutex<HashMap<String, Arc<F::Connector>>>,
    /// Serializes construction per name
    build_locks: Mutex<HashMap<String, BuildLock>>,
}

impl<F: ConnectorFactory> fmt::Debug for ConnectionManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("resolver", &self.resolver)
            .field("timeouts", &self.timeouts)
            .field("active_connections", &self.active_connections())
            .finish()
    }
}

impl ConnectionManager<ConnectionFactory> {
    /// Manager over the built-in backend connectors
    pub fn with_default_factory(resolver: SecretResolver) -> Self {
        Self::new(ConnectionFactory::new(), resolver)
    }
}

impl<F: ConnectorFactory> ConnectionManager<F> {
    pub fn new(factory: F, resolver: SecretResolver) -> Self {
        Self {
            factory,
            resolver,
            timeouts: TimeoutConfig::default(),
            local_configurations: RwLock::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn resolver(&self) -> &SecretResolver {
        &self.resolver
    }

    /// Register (or replace) the fallback configuration for `name`
    ///
    /// Does not touch a connector that is already pooled under `name`.
    pub fn register_local_configuration(&self, name: impl Into<String>, config: ConnectionConfig) {
        self.local_configurations.write().insert(name.into(), config);
    }

    /// Names with a local fallback configuration, sorted
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.local_configurations.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the pooled connector for `name`, building and connecting one if
    /// none is pooled or the pooled one fails its health check
    pub async fn get_connection(&self, name: &str) -> Result<Arc<F::Connector>, ConnectionError> {
        if let Some(connection) = self.healthy_pooled(name).await {
            return Ok(connection);
        }

        let entry = self.build_lock(name);
        let _building = entry.lock.lock().await;
        self.build_connection(name).await
    }

    /// [`get_connection`](Self::get_connection) that gives up with
    /// [`ConnectionError::Cancelled`] once `token` fires
    pub async fn get_connection_cancellable(
        &self,
        name: &str,
        token: &CancellationToken,
    ) -> Result<Arc<F::Connector>, ConnectionError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(connection = %name, "Connection request cancelled");
                Err(ConnectionError::Cancelled { name: name.to_string() })
            }
            result = self.get_connection(name) => result,
        }
    }

    /// Whether a connector is pooled under `name`
    pub fn has_connection(&self, name: &str) -> bool {
        self.connections.lock().contains_key(name)
    }

    /// Names of all pooled connectors, sorted
    pub fn active_connections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove `name` from the pool and disconnect it. No-op if absent.
    ///
    /// The wait for the native client is bounded by the connect timeout; a
    /// connector whose handle is still borrowed past that is left to close
    /// when its last reference drops.
    pub async fn disconnect(&self, name: &str) {
        let removed = self.connections.lock().remove(name);

        if let Some(connection) = removed {
            close(name, connection.as_ref(), self.timeouts.connect_timeout).await;
        }
    }

    /// Empty the pool, disconnecting every connector
    pub async fn disconnect_all(&self) {
        let drained: Vec<(String, Arc<F::Connector>)> = self.connections.lock().drain().collect();
        let timeout = self.timeouts.connect_timeout;

        join_all(
            drained
                .iter()
                .map(|(name, connection)| close(name, connection.as_ref(), timeout)),
        )
        .await;
    }

    /// Disconnect `name` and build it again
    pub async fn refresh_connection(&self, name: &str) -> Result<Arc<F::Connector>, ConnectionError> {
        self.disconnect(name).await;
        self.get_connection(name).await
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Pooled connector if it passes a health check; evicts it otherwise
    async fn healthy_pooled(&self, name: &str) -> Option<Arc<F::Connector>> {
        let pooled = self.connections.lock().get(name).cloned()?;

        let healthy = tokio::time::timeout(self.timeouts.health_check_timeout, pooled.is_healthy())
            .await
            .unwrap_or(false);

        if healthy {
            return Some(pooled);
        }

        warn!(connection = %name, "Connection unhealthy, recreating");

        // Only evict the instance we checked; a concurrent caller may already
        // have replaced it
        let evicted = {
            let mut connections = self.connections.lock();
            let is_current = connections
                .get(name)
                .is_some_and(|current| Arc::ptr_eq(current, &pooled));
            if is_current {
                connections.remove(name);
            }
            is_current
        };

        // Borrowed handles keep the stale client locked; close it off the
        // lookup path
        if evicted {
            let name = name.to_string();
            let timeout = self.timeouts.connect_timeout;
            tokio::spawn(async move { close(&name, pooled.as_ref(), timeout).await });
        }

        None
    }

    async fn build_connection(&self, name: &str) -> Result<Arc<F::Connector>, ConnectionError> {
        // Another caller may have finished building while we waited
        if let Some(connection) = self.connections.lock().get(name).cloned() {
            return Ok(connection);
        }

        let config = self.resolve_configuration(name).await?;

        let driver = config
            .driver()
            .ok_or_else(|| ConnectionError::not_found(name, NotFoundReason::DriverNotSpecified))?;

        info!(connection = %name, driver = %driver, "Creating database connection");

        let connection = Arc::new(self.factory.create(&driver, config, name)?);

        match with_timeout(self.timeouts.connect_timeout, connection.connect()).await {
            Ok(()) => {}
            Err(TimeoutError::Timeout(timeout)) => {
                connection.disconnect().await;
                return Err(ConnectionError::Timeout {
                    name: name.to_string(),
                    timeout,
                });
            }
            Err(TimeoutError::Inner(e)) => return Err(e.into()),
        }

        self.connections
            .lock()
            .insert(name.to_string(), Arc::clone(&connection));

        Ok(connection)
    }

    /// Secret store first (when enabled), then the local fallback map
    async fn resolve_configuration(&self, name: &str) -> Result<ConnectionConfig, ConnectionError> {
        if self.resolver.is_enabled() {
            match self.resolver.get_secret(name).await {
                Ok(config) => return Ok(config),
                Err(e) => {
                    error!(
                        connection = %name,
                        error = %e,
                        "Failed to get secret, falling back to local config"
                    );
                }
            }
        }

        self.local_configurations
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ConnectionError::not_found(name, NotFoundReason::NoConfiguration))
    }

    fn build_lock<'a>(&'a self, name: &'a str) -> BuildLockEntry<'a, F> {
        let lock = Arc::clone(self.build_locks.lock().entry(name.to_string()).or_default());
        BuildLockEntry {
            manager: self,
            name,
            lock,
        }
    }

    /// Drop the per-name lock once nobody else is waiting on it
    fn release_build_lock(&self, name: &str, lock: &BuildLock) {
        let mut locks = self.build_locks.lock();
        if Arc::strong_count(lock) <= 2 {
            locks.remove(name);
        }
    }
}

/// Disconnect a connector that is no longer pooled, waiting at most `timeout`
async fn close<C: DatabaseConnection>(name: &str, connection: &C, timeout: Duration) {
    match tokio::time::timeout(timeout, connection.disconnect()).await {
        Ok(()) => info!(connection = %name, "Connection disconnected"),
        Err(_) => warn!(
            connection = %name,
            timeout_ms = timeout.as_millis() as u64,
            "Disconnect timed out while the connection is still borrowed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::BackendKind;
    use crate::error::ConnectError;
    use crate::secrets::{SecretCache, SecretStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use uuid::Uuid;

    #[derive(Debug)]
    struct FakeConnector {
        name: String,
        kind: BackendKind,
        instance_id: Uuid,
        healthy: AtomicBool,
        connected: AtomicBool,
        connect_delay: Duration,
        fail_connect: bool,
        /// Stands in for the native client slot the real connectors guard
        client: tokio::sync::RwLock<()>,
    }

    impl FakeConnector {
        fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }

        async fn handle(&self) -> tokio::sync::RwLockReadGuard<'_, ()> {
            self.client.read().await
        }
    }

    #[async_trait]
    impl DatabaseConnection for FakeConnector {
        async fn connect(&self) -> Result<(), ConnectError> {
            tokio::time::sleep(self.connect_delay).await;
            if self.fail_connect {
                return Err(ConnectError::new(self.kind, "connection refused"));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn is_healthy(&self) -> bool {
            self.connected.load(Ordering::SeqCst) && self.healthy.load(Ordering::SeqCst)
        }

        async fn disconnect(&self) {
            let _slot = self.client.write().await;
            self.connected.store(false, Ordering::SeqCst);
        }

        async fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn instance_id(&self) -> Uuid {
            self.instance_id
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        created: AtomicUsize,
        connect_delay: Duration,
        fail_connect: bool,
    }

    impl FakeFactory {
        fn slow(connect_delay: Duration) -> Self {
            Self {
                connect_delay,
                ..Default::default()
            }
        }

        fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }
    }

    impl ConnectorFactory for FakeFactory {
        type Connector = FakeConnector;

        fn create(
            &self,
            driver: &str,
            _config: ConnectionConfig,
            name: &str,
        ) -> Result<FakeConnector, ConnectionError> {
            let kind = BackendKind::from_driver(driver).ok_or_else(|| {
                ConnectionError::UnsupportedDatabase {
                    driver: driver.to_string(),
                }
            })?;
            self.created.fetch_add(1, Ordering::SeqCst);

            Ok(FakeConnector {
                name: name.to_string(),
                kind,
                instance_id: Uuid::new_v4(),
                healthy: AtomicBool::new(true),
                connected: AtomicBool::new(false),
                connect_delay: self.connect_delay,
                fail_connect: self.fail_connect,
                client: tokio::sync::RwLock::new(()),
            })
        }
    }

    #[derive(Default)]
    struct CountingStore {
        payloads: HashMap<String, String>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl SecretStore for CountingStore {
        async fn fetch(&self, name: &str) -> Result<String, String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.payloads
                .get(name)
                .cloned()
                .ok_or_else(|| "ResourceNotFoundException".to_string())
        }
    }

    fn local_manager(factory: FakeFactory) -> ConnectionManager<FakeFactory> {
        ConnectionManager::new(factory, SecretResolver::disabled(SecretCache::in_memory(100)))
    }

    /// Evicted connectors are closed on a detached task
    async fn closed_eventually(connection: &FakeConnector) -> bool {
        for _ in 0..50 {
            if !connection.is_connected().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn driver(name: &str) -> ConnectionConfig {
        ConnectionConfig::new().with("driver", name)
    }

    #[tokio::test]
    async fn test_local_fallback_when_secrets_disabled() {
        let manager = local_manager(FakeFactory::default());
        manager.register_local_configuration("n1", driver("pgsql"));

        let connection = manager.get_connection("n1").await.unwrap();
        assert_eq!(connection.kind(), BackendKind::PostgreSql);
        assert!(connection.is_connected().await);
        assert!(manager.has_connection("n1"));
    }

    #[tokio::test]
    async fn test_pooled_connection_is_reused() {
        let manager = local_manager(FakeFactory::default());
        manager.register_local_configuration("n1", driver("redis"));

        let first = manager.get_connection("n1").await.unwrap();
        let second = manager.get_connection("n1").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.factory().created(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_build_once() {
        let manager = local_manager(FakeFactory::slow(Duration::from_millis(50)));
        manager.register_local_configuration("n1", driver("mysql"));

        let results =
            join_all((0..10).map(|_| manager.get_connection("n1"))).await;

        let connections: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(manager.factory().created(), 1);
        assert!(connections.iter().all(|c| Arc::ptr_eq(c, &connections[0])));
    }

    #[tokio::test]
    async fn test_cache_entry_wins_over_store_and_local() {
        let store = Arc::new(CountingStore {
            payloads: HashMap::from([("n1".to_string(), r#"{"driver":"mysql"}"#.to_string())]),
            ..Default::default()
        });
        let cache = SecretCache::in_memory(100);
        cache.set("n1", &driver("redis"), None).await;

        let manager = ConnectionManager::new(
            FakeFactory::default(),
            SecretResolver::new(store.clone(), cache),
        );
        manager.register_local_configuration("n1", driver("dynamodb"));

        let connection = manager.get_connection("n1").await.unwrap();
        assert_eq!(connection.kind(), BackendKind::Redis);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_falls_back_to_local() {
        let store = Arc::new(CountingStore::default());
        let manager = ConnectionManager::new(
            FakeFactory::default(),
            SecretResolver::new(store.clone(), SecretCache::in_memory(100)),
        );
        manager.register_local_configuration("n1", driver("mssql"));

        let connection = manager.get_connection("n1").await.unwrap();
        assert_eq!(connection.kind(), BackendKind::SqlServer);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let manager = local_manager(FakeFactory::default());

        let err = manager.get_connection("missing").await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::ConnectionNotFound {
                reason: NotFoundReason::NoConfiguration,
                ..
            }
        ));
        assert!(!manager.has_connection("missing"));
    }

    #[tokio::test]
    async fn test_missing_driver_from_any_tier() {
        let manager = local_manager(FakeFactory::default());
        manager.register_local_configuration("local", ConnectionConfig::new().with("host", "h"));

        let err = manager.get_connection("local").await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::ConnectionNotFound {
                reason: NotFoundReason::DriverNotSpecified,
                ..
            }
        ));

        let store = Arc::new(CountingStore {
            payloads: HashMap::from([("remote".to_string(), r#"{"host":"h"}"#.to_string())]),
            ..Default::default()
        });
        let manager = ConnectionManager::new(
            FakeFactory::default(),
            SecretResolver::new(store, SecretCache::in_memory(100)),
        );

        let err = manager.get_connection("remote").await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::ConnectionNotFound {
                reason: NotFoundReason::DriverNotSpecified,
                ..
            }
        ));
        assert_eq!(manager.factory().created(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_driver_propagates() {
        let manager = local_manager(FakeFactory::default());
        manager.register_local_configuration("docs", driver("mongo"));

        let err = manager.get_connection("docs").await.unwrap_err();
        assert!(matches!(err, ConnectionError::UnsupportedDatabase { ref driver } if driver == "mongo"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_not_pooled() {
        let manager = local_manager(FakeFactory {
            fail_connect: true,
            ..Default::default()
        });
        manager.register_local_configuration("n1", driver("redis"));

        let err = manager.get_connection("n1").await.unwrap_err();
        assert!(matches!(err, ConnectionError::Connect(ref e) if e.backend == BackendKind::Redis));
        assert!(!manager.has_connection("n1"));
    }

    #[tokio::test]
    async fn test_unhealthy_connection_is_rebuilt() {
        let manager = local_manager(FakeFactory::default());
        manager.register_local_configuration("n2", driver("redis"));

        let stale = manager.get_connection("n2").await.unwrap();
        stale.set_healthy(false);

        let fresh = manager.get_connection("n2").await.unwrap();
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert_ne!(stale.instance_id(), fresh.instance_id());
        assert!(closed_eventually(&stale).await);
        assert!(fresh.is_healthy().await);
        assert_eq!(manager.factory().created(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_and_introspection() {
        let manager = local_manager(FakeFactory::default());
        manager.register_local_configuration("b", driver("redis"));
        manager.register_local_configuration("a", driver("mysql"));
        assert_eq!(manager.registered_names(), vec!["a", "b"]);

        let a = manager.get_connection("a").await.unwrap();
        manager.get_connection("b").await.unwrap();
        assert_eq!(manager.active_connections(), vec!["a", "b"]);

        manager.disconnect("a").await;
        assert!(!a.is_connected().await);
        assert!(!manager.has_connection("a"));

        // absent name is a no-op
        manager.disconnect("a").await;

        manager.disconnect_all().await;
        assert!(manager.active_connections().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_builds_new_instance() {
        let manager = local_manager(FakeFactory::default());
        manager.register_local_configuration("n1", driver("redis"));

        let before = manager.get_connection("n1").await.unwrap();
        let after = manager.refresh_connection("n1").await.unwrap();

        assert_ne!(before.instance_id(), after.instance_id());
        assert!(!before.is_connected().await);
        assert!(manager.has_connection("n1"));
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let manager = local_manager(FakeFactory::slow(Duration::from_secs(5)))
            .with_timeouts(TimeoutConfig::new().with_connect_timeout(Duration::from_millis(50)));
        manager.register_local_configuration("n1", driver("redis"));

        let err = manager.get_connection("n1").await.unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { ref name, .. } if name == "n1"));
        assert!(!manager.has_connection("n1"));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let manager = local_manager(FakeFactory::slow(Duration::from_secs(5)));
        manager.register_local_configuration("n1", driver("redis"));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = manager
            .get_connection_cancellable("n1", &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Cancelled { .. }));
        assert!(!manager.has_connection("n1"));
    }

    #[tokio::test]
    async fn test_build_locks_are_released() {
        let manager = local_manager(FakeFactory::default());
        manager.register_local_configuration("n1", driver("redis"));

        manager.get_connection("n1").await.unwrap();
        let _ = manager.get_connection("unknown").await;

        assert!(manager.build_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_build_releases_lock() {
        let manager = local_manager(FakeFactory::slow(Duration::from_secs(5)));
        manager.register_local_configuration("n1", driver("redis"));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = manager
            .get_connection_cancellable("n1", &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Cancelled { .. }));
        assert!(manager.build_locks.lock().is_empty());

        // A caller's own deadline drops the future the same way
        let elapsed = tokio::time::timeout(Duration::from_millis(20), manager.get_connection("n1")).await;
        assert!(elapsed.is_err());
        assert!(manager.build_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_connection_rebuilt_while_handle_borrowed() {
        let manager = local_manager(FakeFactory::default())
            .with_timeouts(TimeoutConfig::new().with_connect_timeout(Duration::from_millis(100)));
        manager.register_local_configuration("n1", driver("dynamodb"));

        let stale = manager.get_connection("n1").await.unwrap();
        let borrowed = stale.handle().await;
        stale.set_healthy(false);

        let fresh = tokio::time::timeout(Duration::from_secs(2), manager.get_connection("n1"))
            .await
            .expect("lookup blocked on a borrowed handle")
            .unwrap();
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert!(fresh.is_healthy().await);

        // The stale client closes once the borrower lets go
        drop(borrowed);
        assert!(closed_eventually(&stale).await);
    }

    #[tokio::test]
    async fn test_disconnect_does_not_wait_on_borrowed_handle() {
        let manager = local_manager(FakeFactory::default())
            .with_timeouts(TimeoutConfig::new().with_connect_timeout(Duration::from_millis(50)));
        manager.register_local_configuration("a", driver("redis"));
        manager.register_local_configuration("b", driver("mysql"));

        let a = manager.get_connection("a").await.unwrap();
        let b = manager.get_connection("b").await.unwrap();
        let _held_a = a.handle().await;
        let _held_b = b.handle().await;

        tokio::time::timeout(Duration::from_secs(2), manager.disconnect("a"))
            .await
            .expect("disconnect blocked on a borrowed handle");
        assert!(!manager.has_connection("a"));

        tokio::time::timeout(Duration::from_secs(2), manager.disconnect_all())
            .await
            .expect("disconnect_all blocked on a borrowed handle");
        assert!(manager.active_connections().is_empty());
    }
}
