//! Utility modules
//!
//! Contains timeout handling shared by the connectors and the manager.

pub mod timeout;

pub use timeout::{with_timeout, TimeoutConfig, TimeoutError};
