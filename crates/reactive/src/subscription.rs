//! Subscription specs.
//!
//! A `SubscriptionSpec` is one observer's contract with the cache: what it
//! renders (root type, selection, variables, parent record) and how new data
//! is pushed into it. Specs are identified by their `SubscriptionHandle`,
//! issued once at construction.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use serde_json::Value;
use std::rc::Rc;
use tessera_core::{RecordId, Selection, Variables, ROOT_ID};

/// Opaque identity of a subscription.
pub type SubscriptionHandle = u64;

/// Callback invoked with the freshly read value of a subscription.
pub type SetCallback = Box<dyn Fn(&Value)>;

/// Global handle counter.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Issues the next subscription handle.
pub fn next_handle() -> SubscriptionHandle {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

/// One observer's subscription contract.
pub struct SubscriptionSpec {
    handle: SubscriptionHandle,
    /// Type of the record the selection starts from.
    pub root_type: String,
    /// Record the selection starts from; the root record when `None`.
    pub parent_id: Option<RecordId>,
    pub selection: Rc<Selection>,
    pub variables: Variables,
    set: SetCallback,
}

impl SubscriptionSpec {
    /// Creates a spec rooted at the query root.
    pub fn new<F>(root_type: impl Into<String>, selection: Rc<Selection>, set: F) -> Self
    where
        F: Fn(&Value) + 'static,
    {
        Self {
            handle: next_handle(),
            root_type: root_type.into(),
            parent_id: None,
            selection,
            variables: Variables::new(),
            set: Box::new(set),
        }
    }

    /// Roots the spec at another record, builder style.
    pub fn with_parent(mut self, parent_id: impl Into<RecordId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets the variables, builder style.
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// Returns the subscription handle.
    #[inline]
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Returns the record the selection starts from.
    #[inline]
    pub fn parent_id(&self) -> &str {
        self.parent_id.as_deref().unwrap_or(ROOT_ID)
    }

    /// Pushes a new value into the observer.
    #[inline]
    pub fn set(&self, value: &Value) {
        (self.set)(value);
    }
}

impl fmt::Debug for SubscriptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSpec")
            .field("handle", &self.handle)
            .field("root_type", &self.root_type)
            .field("parent_id", &self.parent_id)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}
