//! Tessera - A normalized GraphQL cache with reactive subscriptions.
//!
//! This crate is the entry point of the Tessera workspace. It ties the
//! record storage, the subscription registry and the optimistic key manager
//! together behind one `Cache`, and re-exports the building blocks.
//!
//! # Core Components
//!
//! - `Cache`: normalizes writes, reads selections and notifies subscribers
//! - `QueryPipeline`: (re)subscribes a query document when its variables change
//! - `MutationPipeline`: routes optimistic responses and reconciles identities
//! - `pagination`: cursor and offset page windows over paginated documents
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tessera_cache::{Cache, FieldSelection, Selection, Variables, WriteArgs};
//!
//! let selection = Selection::new().field(
//!     "viewer",
//!     FieldSelection::linked(
//!         "viewer",
//!         "User",
//!         Selection::new()
//!             .field("id", FieldSelection::scalar("id", "ID"))
//!             .field("name", FieldSelection::scalar("name", "String")),
//!     ),
//! );
//!
//! let mut cache: Cache = Cache::default();
//! cache.write(WriteArgs {
//!     selection: &selection,
//!     data: &json!({ "viewer": { "id": "1", "name": "Alice" } }),
//!     variables: &Variables::new(),
//!     parent: None,
//! }).unwrap();
//!
//! let result = cache.read(&selection, None, &Variables::new());
//! assert_eq!(result.data, json!({ "viewer": { "id": "1", "name": "Alice" } }));
//! ```

mod cache;
mod pipeline;

pub use cache::{Cache, ReadResult, WriteArgs};
pub use pipeline::{MutationPipeline, Observer, QueryPipeline};

pub use tessera_core::{
    Artifact, ArtifactKind, CacheConfig, CachePolicy, DataSource, Error, FieldSelection, QueryResult,
    Result, Selection, Variables, ROOT_ID,
};
pub use tessera_optimistic as optimistic;
pub use tessera_pagination as pagination;
pub use tessera_reactive as reactive;
pub use tessera_storage as storage;
