//! In-memory record storage.
//!
//! This module provides `InMemoryStorage`, which keeps every normalized
//! record as a map of field keys to stored values, plus the key aliases
//! registered once optimistic identities are reconciled.

use hashbrown::HashMap;
use tessera_core::{FieldKey, RecordId, RecordStorage, StoredValue};

/// Maximum alias chain followed when resolving a record id.
const MAX_ALIAS_DEPTH: usize = 32;

/// Records keyed by id, each a map of field key to value.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    /// Record id → fields.
    records: HashMap<RecordId, HashMap<FieldKey, StoredValue>>,
    /// Aliased id → target id.
    key_map: HashMap<RecordId, RecordId>,
}

impl InMemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves registered aliases for a record id.
    pub fn resolve_id<'a>(&'a self, id: &'a str) -> &'a str {
        let mut current = id;
        for _ in 0..MAX_ALIAS_DEPTH {
            match self.key_map.get(current) {
                Some(target) if target != current => current = target,
                _ => break,
            }
        }
        current
    }

    /// Returns true if the record has at least one field.
    pub fn has_record(&self, id: &str) -> bool {
        self.records.contains_key(self.resolve_id(id))
    }

    /// Returns the number of records.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Returns the field keys written for a record.
    pub fn fields(&self, id: &str) -> Vec<&str> {
        self.records
            .get(self.resolve_id(id))
            .map(|fields| fields.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default()
    }
}

impl RecordStorage for InMemoryStorage {
    fn resolve(&self, id: &str) -> RecordId {
        self.resolve_id(id).to_string()
    }

    fn get(&self, id: &str, key: &str) -> Option<StoredValue> {
        self.records
            .get(self.resolve_id(id))
            .and_then(|fields| fields.get(key))
            .cloned()
    }

    fn set(&mut self, id: &str, key: &str, value: StoredValue) {
        let resolved = self.resolve_id(id).to_string();
        self.records
            .entry(resolved)
            .or_default()
            .insert(key.to_string(), value);
    }

    fn register_key_map(&mut self, source: &str, target: &str) {
        if source == target {
            return;
        }
        self.key_map.insert(source.to_string(), target.to_string());
    }

    fn clear(&mut self) {
        self.records.clear();
        self.key_map.clear();
    }
}
