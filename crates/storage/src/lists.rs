//! A list registry that keeps the latest registration of every list field.

use indexmap::IndexMap;
use tessera_core::{FieldKey, ListRegistration, ListRegistry, RecordId};

/// (list name, record id, field key) identifying one registered list field.
type ListKey = (String, RecordId, FieldKey);

/// Keeps list registrations in first-arrival order.
///
/// Registering the same list field again replaces the stored registration,
/// so re-subscribing never grows the registry.
#[derive(Debug, Default)]
pub struct RecordingLists {
    registrations: IndexMap<ListKey, ListRegistration>,
}

impl RecordingLists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all registrations received so far.
    pub fn registrations(&self) -> impl Iterator<Item = &ListRegistration> {
        self.registrations.values()
    }

    /// Returns the number of registered list fields.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Returns the registrations made under a list name.
    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ListRegistration> + 'a {
        self.registrations.values().filter(move |r| r.name == name)
    }
}

impl ListRegistry for RecordingLists {
    fn add(&mut self, registration: ListRegistration) {
        let key = (
            registration.name.clone(),
            registration.record_id.clone(),
            registration.key.clone(),
        );
        self.registrations.insert(key, registration);
    }

    fn clear(&mut self) {
        self.registrations.clear();
    }
}
