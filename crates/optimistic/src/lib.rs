//! Tessera Optimistic - Placeholder identities for optimistic mutations.
//!
//! When a mutation declares optimistic keys, the identities it creates are
//! unknown until the server answers. This crate:
//!
//! - fills those keys with placeholders in the optimistic response
//! - suspends requests whose variables still reference a placeholder
//! - swaps placeholders for real values once the response arrives, and
//!   aliases the real record identity onto the optimistic record
//!
//! # Example
//!
//! ```ignore
//! let mut keys = OptimisticKeyManager::new(config);
//!
//! let mutation = keys.start(&artifact, Some(&mut optimistic_response))?;
//! cache.write(&artifact.selection, &optimistic_response, &variables)?;
//!
//! // Held back until the placeholder resolves
//! keys.before_network(variables, |resolved| send(resolved));
//!
//! keys.after_network(mutation, &artifact, &server_response, &mut cache)?;
//! keys.end(mutation);
//! ```

mod keys;
mod placeholder;

pub use keys::{Dispatch, IdentityReconciler, KeyCallback, MutationId, OptimisticKeyManager};
pub use placeholder::{placeholder_key, PlaceholderGenerator};
