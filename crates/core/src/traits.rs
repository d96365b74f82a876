//! Contracts of the collaborators the cache core relies on.
//!
//! The core never owns record data: it reads and writes it through
//! [`RecordStorage`], announces list-backed fields to a [`ListRegistry`] and
//! marks observed fields through a [`LifetimeTracker`].

use crate::selection::Selection;
use crate::value::{FieldKey, RecordId, StoredValue, Variables};
use std::rc::Rc;

/// Normalized record storage.
pub trait RecordStorage {
    /// Returns the value stored under `(id, key)`.
    ///
    /// `None` means the field has never been written, which readers report
    /// as partial data.
    fn get(&self, id: &str, key: &str) -> Option<StoredValue>;

    /// Stores a value under `(id, key)`.
    fn set(&mut self, id: &str, key: &str, value: StoredValue);

    /// Aliases `source` to `target`: later reads and writes of `source`
    /// resolve to `target`.
    fn register_key_map(&mut self, source: &str, target: &str);

    /// Drops every record.
    fn clear(&mut self);

    /// Returns the `__typename` stored for a record.
    fn typename(&self, id: &str) -> Option<String> {
        self.get(id, "__typename")
            .and_then(|v| v.as_scalar().and_then(|s| s.as_str().map(str::to_string)))
    }

    /// Returns the id `id` is stored under once aliases are followed.
    fn resolve(&self, id: &str) -> RecordId {
        id.to_string()
    }

    /// Returns the linked ids stored under `(id, key)`, aliases resolved.
    fn linked_ids(&self, id: &str, key: &str) -> Vec<RecordId> {
        self.get(id, key)
            .map(|v| v.linked_ids().iter().map(|linked| self.resolve(linked)).collect())
            .unwrap_or_default()
    }
}

/// A list-backed field announced to the list registry.
#[derive(Clone, Debug, PartialEq)]
pub struct ListRegistration {
    pub name: String,
    pub connection: bool,
    pub record_id: RecordId,
    pub record_type: String,
    pub list_type: String,
    pub key: FieldKey,
    pub selection: Option<Rc<Selection>>,
    /// Filter values, resolved against the subscription variables.
    pub filters: Variables,
}

/// Registry of named lists used for structural inserts and deletes.
pub trait ListRegistry {
    fn add(&mut self, registration: ListRegistration);

    /// Drops every registered list.
    fn clear(&mut self) {}
}

/// Tracks which fields are actively observed.
pub trait LifetimeTracker {
    /// Marks `(id, key)` as observed again.
    fn reset_lifetime(&mut self, id: &str, key: &str);

    /// Forgets every tracked field.
    fn clear(&mut self) {}
}
