//! Local fallback connection configurations
//!
//! Connection maps are read with the `config` crate from an optional file
//! (TOML, JSON or YAML, by extension) layered under `CONNECTION__<NAME>__<KEY>`
//! environment variables. Names and keys are lowercased by the environment
//! source.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::connectors::ConnectionConfig;

pub const ENV_PREFIX: &str = "CONNECTION";
pub const ENV_SEPARATOR: &str = "__";

/// Load connections from `file` (if any) and the process environment
pub fn load_local_connections(file: Option<&Path>) -> Result<BTreeMap<String, ConnectionConfig>> {
    load_local_connections_from(file, None)
}

/// Same as [`load_local_connections`], reading environment variables from
/// `env` instead of the process environment when given
pub fn load_local_connections_from(
    file: Option<&Path>,
    env: Option<HashMap<String, String>>,
) -> Result<BTreeMap<String, ConnectionConfig>> {
    let mut builder = config::Config::builder();

    if let Some(path) = file {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .source(env),
    );

    let loaded = builder
        .build()
        .context("Failed to read local connection configurations")?;

    let connections: BTreeMap<String, ConnectionConfig> = loaded
        .try_deserialize()
        .context("Local connection configurations must be tables of scalar values")?;

    tracing::debug!(count = connections.len(), "Loaded local connection configurations");

    Ok(connections)
}
