//! Placeholder generation for optimistic keys.
//!
//! Placeholders are derived from the wall clock in milliseconds. A generator
//! never hands out the same stamp twice, so placeholders allocated within one
//! mutation never collide even when generated in the same millisecond.

use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use tessera_core::{Error, Result};

/// Issues strictly increasing, time-based placeholder values.
#[derive(Debug, Default)]
pub struct PlaceholderGenerator {
    last: u64,
}

impl PlaceholderGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_stamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let stamp = now.max(self.last + 1);
        self.last = stamp;
        stamp
    }

    /// Generates a placeholder for a scalar of the given type.
    ///
    /// `Int` placeholders are numbers, `String` and `ID` placeholders are
    /// decimal strings. Any other type is an error: the caller must supply
    /// the value in the optimistic response.
    pub fn generate(&mut self, type_name: &str) -> Result<Value> {
        match type_name {
            "Int" => Ok(Value::from(self.next_stamp())),
            "String" | "ID" => Ok(Value::String(self.next_stamp().to_string())),
            other => Err(Error::unsupported_optimistic_key(other)),
        }
    }
}

/// Returns the lookup key of a placeholder value.
///
/// Only strings and numbers can be placeholders.
pub fn placeholder_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
