//! Tessera Storage - In-memory collaborators for the Tessera cache.
//!
//! This crate provides the reference implementations of the collaborator
//! contracts declared in `tessera-core`:
//!
//! - `InMemoryStorage`: normalized record storage with key aliasing
//! - `RecordingLists`: a list registry that records registrations
//! - `LifetimeCounter`: per-field lifetime bookkeeping
//!
//! # Example
//!
//! ```rust
//! use tessera_core::{LinkValue, RecordStorage, StoredValue, ROOT_ID};
//! use tessera_storage::InMemoryStorage;
//! use serde_json::json;
//!
//! let mut storage = InMemoryStorage::new();
//! storage.set("User:1", "__typename", StoredValue::from(json!("User")));
//! storage.set(ROOT_ID, "viewer", StoredValue::from(LinkValue::from("User:1")));
//!
//! assert_eq!(storage.typename("User:1").as_deref(), Some("User"));
//! assert_eq!(storage.linked_ids(ROOT_ID, "viewer"), vec!["User:1"]);
//! ```

mod lifetimes;
mod lists;
mod record_store;

pub use lifetimes::LifetimeCounter;
pub use lists::RecordingLists;
pub use record_store::InMemoryStorage;
