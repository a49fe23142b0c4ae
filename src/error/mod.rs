//! Error types
//!
//! Errors surfaced by connection resolution, secret resolution and
//! connector lifecycle.

pub mod types;

pub use types::{
    CacheError, CacheResult, ConnectError, ConnectionError, NotFoundReason, SecretError,
};
