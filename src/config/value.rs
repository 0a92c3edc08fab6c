//! Dynamically-typed config property values.

use crate::core::BitpackError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property bag of a single config layer. Ordered so that saved files are
/// deterministic.
pub type ConfigProperties = BTreeMap<String, ConfigValue>;

/// A JSON value stored in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Typed read of a string property.
    ///
    /// # Errors
    ///
    /// [`BitpackError::InvalidConfigValue`] if the value is not a string.
    pub fn expect_str(&self, key: &str) -> Result<&str, BitpackError> {
        self.as_str().ok_or_else(|| BitpackError::InvalidConfigValue {
            key: key.to_string(),
            expected: "string",
        })
    }

    /// Parse a command-line argument: valid JSON is taken as-is, anything
    /// else is a plain string.
    pub fn parse_cli(raw: &str) -> Self {
        serde_json::from_str::<serde_json::Value>(raw).map_or_else(|_| Self::String(raw.to_string()), Self::from)
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            other => {
                let json = serde_json::to_string_pretty(other).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<ConfigValue> for serde_json::Value {
    fn from(value: ConfigValue) -> Self {
        match value {
            ConfigValue::Null => Self::Null,
            ConfigValue::Bool(b) => Self::Bool(b),
            ConfigValue::Number(n) => Self::Number(n),
            ConfigValue::String(s) => Self::String(s),
            ConfigValue::List(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            ConfigValue::Map(map) => Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}
