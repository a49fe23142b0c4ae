//! Connection configuration map
//!
//! A [`ConnectionConfig`] is the resolved configuration blob for one logical
//! connection name: driver, host, port, credentials, region, TLS flags and so
//! on. It is produced by the secret resolver or a locally registered map and
//! is serialized as a flat JSON object when cached.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Keys whose values are masked by [`ConnectionConfig::redacted`]
const SENSITIVE_KEYS: &[&str] = &["password", "secret", "key", "token"];

/// String-keyed map of scalar configuration values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionConfig(BTreeMap<String, Value>);

impl ConnectionConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get the raw value for a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The configured driver alias, if present and non-empty
    pub fn driver(&self) -> Option<String> {
        self.get_str("driver").filter(|d| !d.trim().is_empty())
    }

    /// Get a value rendered as a string
    ///
    /// Numbers and booleans are rendered with their JSON text; `null`,
    /// arrays and objects are treated as absent.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// First present value among `keys`, or `default`
    ///
    /// Used for aliased keys such as `database`/`dbname` and `user`/`username`.
    pub fn str_or(&self, keys: &[&str], default: &str) -> String {
        keys.iter()
            .find_map(|key| self.get_str(key))
            .unwrap_or_else(|| default.to_string())
    }

    /// Get an unsigned integer, accepting numeric strings
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get a signed integer, accepting numeric strings
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get_u64(key).and_then(|v| u32::try_from(v).ok())
    }

    pub fn get_u16(&self, key: &str) -> Option<u16> {
        self.get_u64(key).and_then(|v| u16::try_from(v).ok())
    }

    /// Get a float, accepting numeric strings
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get a boolean flag
    ///
    /// Accepts JSON booleans, `0`/`1`, and the strings
    /// `true/false`, `yes/no`, `on/off`, `1/0` in any case.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|v| v != 0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Parse a configuration from a JSON object payload
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Serialize to a JSON object payload
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Copy with credential values masked, for logging and diagnostics
    pub fn redacted(&self) -> Self {
        let masked = self
            .0
            .iter()
            .map(|(k, v)| {
                let lower = k.to_lowercase();
                if SENSITIVE_KEYS.iter().any(|s| lower.contains(s)) {
                    (k.clone(), Value::String("***".to_string()))
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect();
        Self(masked)
    }
}

impl From<BTreeMap<String, Value>> for ConnectionConfig {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K, V> FromIterator<(K, V)> for ConnectionConfig
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
