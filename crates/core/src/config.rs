//! Cache configuration.
//!
//! The configuration decides which fields identify a record of a given type.
//! It is usually loaded from the project's JSON configuration file.

use crate::error::{Error, Result};
use crate::value::RecordId;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_keys() -> Vec<String> {
    vec!["id".to_string()]
}

/// Per-type configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeConfig {
    /// Fields that identify a record of this type.
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Configuration shared by every component of one cache instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Key fields used when a type has no entry in `types`.
    #[serde(default = "default_keys")]
    pub default_keys: Vec<String>,
    #[serde(default)]
    pub types: HashMap<String, TypeConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_keys: default_keys(),
            types: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Parses a configuration from JSON.
    pub fn from_json(source: &str) -> Result<Self> {
        let config: CacheConfig =
            serde_json::from_str(source).map_err(|e| Error::config(e.to_string()))?;
        if config.default_keys.is_empty() {
            return Err(Error::config("defaultKeys must not be empty"));
        }
        Ok(config)
    }

    /// Overrides the key fields of a type, builder style.
    pub fn with_type_keys(mut self, type_name: impl Into<String>, keys: &[&str]) -> Self {
        self.types.insert(
            type_name.into(),
            TypeConfig {
                keys: keys.iter().map(|k| k.to_string()).collect(),
            },
        );
        self
    }

    /// Returns the key fields of a type.
    pub fn key_fields_for_type(&self, type_name: &str) -> &[String] {
        match self.types.get(type_name) {
            Some(config) if !config.keys.is_empty() => &config.keys,
            _ => &self.default_keys,
        }
    }

    /// Computes the identity of an object from its key fields.
    ///
    /// Returns `None` if any key field is missing or null.
    pub fn compute_id(&self, type_name: &str, data: &Value) -> Option<String> {
        let mut parts = Vec::new();
        for key in self.key_fields_for_type(type_name) {
            match data.get(key) {
                None | Some(Value::Null) => return None,
                Some(Value::String(s)) => parts.push(s.clone()),
                Some(other) => parts.push(other.to_string()),
            }
        }
        Some(parts.join("__"))
    }

    /// Computes the record id of an object: `{type}:{id}`.
    pub fn record_id(&self, type_name: &str, data: &Value) -> Option<RecordId> {
        self.compute_id(type_name, data)
            .map(|id| format!("{}:{}", type_name, id))
    }

    /// Returns true if the object carries every key field of its type.
    pub fn is_keyed(&self, type_name: &str, data: &Value) -> bool {
        self.compute_id(type_name, data).is_some()
    }
}
