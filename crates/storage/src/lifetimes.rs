//! Field lifetime bookkeeping.
//!
//! `LifetimeCounter` tracks, per record field, how many times the field was
//! marked as observed since it was last reset. The counter drives eviction
//! decisions outside the core; here it only records activity.

use hashbrown::HashMap;
use tessera_core::{FieldKey, LifetimeTracker, RecordId};

/// Counts lifetime resets per (record, field).
#[derive(Debug, Default)]
pub struct LifetimeCounter {
    resets: HashMap<(RecordId, FieldKey), usize>,
}

impl LifetimeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times `(id, key)` was marked as observed.
    pub fn resets(&self, id: &str, key: &str) -> usize {
        self.resets
            .get(&(id.to_string(), key.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the number of tracked fields.
    pub fn len(&self) -> usize {
        self.resets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resets.is_empty()
    }
}

impl LifetimeTracker for LifetimeCounter {
    fn reset_lifetime(&mut self, id: &str, key: &str) {
        *self
            .resets
            .entry((id.to_string(), key.to_string()))
            .or_insert(0) += 1;
    }

    fn clear(&mut self) {
        self.resets.clear();
    }
}
