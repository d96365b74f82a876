//! Tessera Core - Core types for the Tessera normalized cache.
//!
//! This crate provides the foundational pieces shared by every Tessera crate:
//!
//! - `RecordId`, `FieldKey`, `StoredValue`: the normalized data model
//! - `evaluate_key`: field key templates evaluated against variables
//! - `Selection`, `Artifact`: the static document shapes handed in by generated artifacts
//! - `CacheConfig`: record identity configuration
//! - `RecordStorage`, `ListRegistry`, `LifetimeTracker`: collaborator contracts
//! - `Error`: error types for cache operations
//!
//! # Example
//!
//! ```rust
//! use tessera_core::{evaluate_key, CacheConfig, Variables};
//! use serde_json::json;
//!
//! let mut variables = Variables::new();
//! variables.insert("first".into(), json!(10));
//! assert_eq!(evaluate_key("friends(first: $first)", &variables), "friends(first: 10)");
//!
//! let config = CacheConfig::default();
//! assert_eq!(
//!     config.record_id("User", &json!({ "id": "1" })),
//!     Some("User:1".to_string())
//! );
//! ```

mod artifact;
mod config;
mod error;
mod key;
mod result;
pub mod selection;
mod traits;
mod value;

pub use artifact::{Artifact, ArtifactKind, PaginateMethod, RefetchMode, RefetchSpec};
pub use config::{CacheConfig, TypeConfig};
pub use error::{Error, Result};
pub use key::evaluate_key;
pub use result::{CachePolicy, DataSource, QueryResult};
pub use selection::{FieldMap, FieldSelection, FilterArg, ListSpec, Selection};
pub use traits::{LifetimeTracker, ListRegistration, ListRegistry, RecordStorage};
pub use value::{is_root_scoped, FieldKey, LinkValue, RecordId, StoredValue, Variables, ROOT_ID};
