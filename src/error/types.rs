//! Connection error types

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::connectors::BackendKind;

/// Why no usable configuration could be produced for a connection name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// Neither the secret store nor the local fallback map knows the name
    NoConfiguration,
    /// A configuration was resolved but it has no `driver` entry
    DriverNotSpecified,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::NoConfiguration => write!(f, "no configuration found"),
            NotFoundReason::DriverNotSpecified => write!(f, "driver not specified"),
        }
    }
}

/// A native client failed to connect
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{backend} connect failed: {message}")]
pub struct ConnectError {
    pub backend: BackendKind,
    pub message: String,
}

impl ConnectError {
    pub fn new(backend: BackendKind, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
        }
    }
}

/// Errors returned by [`ConnectionManager`](crate::manager::ConnectionManager)
/// and [`ConnectionFactory`](crate::factory::ConnectionFactory).
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Database driver \"{driver}\" is not supported")]
    UnsupportedDatabase { driver: String },

    #[error("Connection \"{name}\" not found: {reason}")]
    ConnectionNotFound { name: String, reason: NotFoundReason },

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Connection \"{name}\" timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Connection \"{name}\" was cancelled")]
    Cancelled { name: String },
}

impl ConnectionError {
    pub(crate) fn not_found(name: &str, reason: NotFoundReason) -> Self {
        ConnectionError::ConnectionNotFound {
            name: name.to_string(),
            reason,
        }
    }

    /// Check if this error means no usable configuration exists
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConnectionError::ConnectionNotFound { .. })
    }

    /// Check if a later `refresh_connection` could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectionError::Connect(_)
                | ConnectionError::Timeout { .. }
                | ConnectionError::Cancelled { .. }
        )
    }
}

/// Errors returned by [`SecretResolver`](crate::secrets::SecretResolver)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("Secret resolution is disabled")]
    Disabled,

    #[error("Failed to retrieve secret \"{name}\": {message}")]
    Retrieval { name: String, message: String },
}

impl SecretError {
    pub(crate) fn retrieval(name: &str, message: impl fmt::Display) -> Self {
        SecretError::Retrieval {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

/// Errors raised by a secret cache store
///
/// Never surfaced to callers of [`SecretCache`](crate::secrets::SecretCache);
/// cache failures degrade to misses.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
