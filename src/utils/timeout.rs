//! Timeout utilities for connection handling
//!
//! Every backend round trip (connect, health check, secret fetch) is bounded
//! by one of the deadlines in [`TimeoutConfig`].

use std::time::Duration;

/// Timeout configuration for connection operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Timeout for establishing a native connection (default: 10s)
    pub connect_timeout: Duration,

    /// Timeout for a single health check (default: 5s)
    pub health_check_timeout: Duration,

    /// Timeout for one remote secret fetch (default: 5s)
    pub secret_fetch_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            health_check_timeout: Duration::from_secs(5),
            secret_fetch_timeout: Duration::from_secs(5),
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set health check timeout
    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout = timeout;
        self
    }

    /// Set secret fetch timeout
    pub fn with_secret_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.secret_fetch_timeout = timeout;
        self
    }
}

/// Apply timeout to an async operation
///
/// Returns `Err` with the original error type if the operation fails, or
/// [`TimeoutError::Timeout`] if the deadline passes first.
pub async fn with_timeout<T, E>(
    timeout: Duration,
    future: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, TimeoutError<E>> {
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TimeoutError::Inner(err)),
        Err(_) => Err(TimeoutError::Timeout(timeout)),
    }
}

/// Error type for timeout operations
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Inner(E),
}

impl<E> TimeoutError<E> {
    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::Timeout(_))
    }

    /// Get the inner error if not a timeout
    pub fn into_inner(self) -> Option<E> {
        match self {
            TimeoutError::Inner(e) => Some(e),
            TimeoutError::Timeout(_) => None,
        }
    }
}
