//! Tessera Reactive - Subscription tracking for the Tessera cache.
//!
//! This crate keeps every live subscription attached to the normalized
//! record fields it depends on, so a write to a field can find exactly the
//! observers that must be refreshed.
//!
//! # Core Concepts
//!
//! - `SubscriptionSpec`: one observer's contract (selection, variables, `set` callback)
//! - `SubscriptionHandle`: the opaque identity of a spec, used for reference counting
//! - `SubscriptionRegistry`: record → field → subscribers, walked through linked records
//!
//! # Example
//!
//! ```ignore
//! use tessera_reactive::{AddArgs, RegistryEnv, SubscriptionRegistry, SubscriptionSpec};
//!
//! let spec = Rc::new(SubscriptionSpec::new("Query", selection, |value| {
//!     println!("new value: {}", value);
//! }));
//!
//! let mut registry = SubscriptionRegistry::new();
//! registry.add(&mut env, AddArgs {
//!     parent: spec.parent_id(),
//!     spec: &spec,
//!     selection: &spec.selection,
//!     variables: &spec.variables,
//!     parent_type: None,
//! })?;
//!
//! // Every subscriber of User:1.name, ready to be notified
//! let subscribers = registry.get("User:1", "name");
//! ```

pub mod registry;
pub mod subscription;

pub use registry::{AddArgs, RegistryEnv, SubscriberSelection, SubscriptionRegistry, Visited};
pub use subscription::{next_handle, SetCallback, SubscriptionHandle, SubscriptionSpec};
