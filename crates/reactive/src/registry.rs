//! Subscription registry.
//!
//! This module provides `SubscriptionRegistry`, which maps every observed
//! (record, field key) pair to the subscriptions that must be notified when
//! the field changes. Subscribing walks the selection through the records
//! currently linked in storage, so a spec is registered on every record its
//! selection reaches.
//!
//! Each entry reference-counts its subscribers by handle: every path from the
//! spec's parent to a field adds one reference, subscribing the same spec
//! twice bumps the count without duplicating the selection entry, and the
//! entry disappears once every count drops to zero. Records are keyed by the
//! id storage resolves them to, so aliased identities share one entry.

use crate::subscription::{SubscriptionHandle, SubscriptionSpec};
use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;
use std::rc::Rc;
use tessera_core::{
    evaluate_key, Error, FieldKey, FieldSelection, LifetimeTracker, ListRegistration,
    ListRegistry, RecordId, RecordStorage, Result, Selection, Variables, ROOT_ID, is_root_scoped,
};

/// A subscriber of a field: the spec and the selection applied to the
/// records the field links to.
pub type SubscriberSelection = (Rc<SubscriptionSpec>, Option<Rc<Selection>>);

/// Collaborators the registry reads from and notifies while subscribing.
pub struct RegistryEnv<'a> {
    pub storage: &'a dyn RecordStorage,
    pub lists: &'a mut dyn ListRegistry,
    pub lifetimes: &'a mut dyn LifetimeTracker,
}

/// Arguments of [`SubscriptionRegistry::add`].
#[derive(Clone, Copy)]
pub struct AddArgs<'a> {
    pub parent: &'a str,
    pub spec: &'a Rc<SubscriptionSpec>,
    pub selection: &'a Selection,
    pub variables: &'a Variables,
    /// Type of `parent`, used when storage does not know it.
    pub parent_type: Option<&'a str>,
}

/// Cycle guard of one removal traversal.
///
/// Holds the (record, selection) pairs on the path currently being walked.
/// A pair already on the path is a link cycle and is not entered again; a
/// record reached through another parent is walked once per path, matching
/// the references `add` counted along it.
#[derive(Debug, Default)]
pub struct Visited {
    path: HashSet<(RecordId, *const Selection)>,
    walked: usize,
}

impl Visited {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&mut self, id: &str, selection: &Rc<Selection>) -> bool {
        let entered = self.path.insert((id.to_string(), Rc::as_ptr(selection)));
        if entered {
            self.walked += 1;
        }
        entered
    }

    fn leave(&mut self, id: &str, selection: &Rc<Selection>) {
        self.path.remove(&(id.to_string(), Rc::as_ptr(selection)));
    }

    /// Returns the number of (record, selection) pairs entered so far.
    pub fn walked(&self) -> usize {
        self.walked
    }
}

/// A step of a depth-first walk with an explicit work list.
enum Step<'s> {
    Enter(RecordId, &'s Rc<Selection>),
    Leave(RecordId, &'s Rc<Selection>),
}

/// Subscribers of one (record, field key) pair.
#[derive(Default)]
struct FieldSubscribers {
    /// One entry per distinct spec, in subscription order.
    selections: Vec<SubscriberSelection>,
    /// Spec handle → number of live subscriptions through this field.
    reference_counts: HashMap<SubscriptionHandle, usize>,
}

/// Registry of field subscriptions for one cache instance.
#[derive(Default)]
pub struct SubscriptionRegistry {
    /// Record id → field key → subscribers.
    subscribers: HashMap<RecordId, HashMap<FieldKey, FieldSubscribers>>,
    /// Field key → versions of the key seen while subscribing.
    key_versions: HashMap<FieldKey, HashSet<FieldKey>>,
    /// Spec handle → variables it was subscribed with, and how many
    /// subscriptions are bound to them.
    bindings: HashMap<SubscriptionHandle, (Variables, usize)>,
}

/// Resolves the type of a record that is about to be subscribed to.
///
/// Only the root record may lack a `__typename`.
fn subscribed_type(storage: &dyn RecordStorage, id: &str) -> Result<Option<String>> {
    match storage.typename(id) {
        Some(typename) => Ok(Some(typename)),
        None if id == ROOT_ID => Ok(None),
        None => Err(Error::missing_typename(id)),
    }
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `spec` to every visible field of `selection` under `parent`,
    /// recursing into the records those fields currently link to.
    ///
    /// Every link path counts: a record reached twice gets two references.
    /// The walk is bounded by the depth of `selection`. Fails if a non-root
    /// record on the way has no `__typename`.
    pub fn add(&mut self, env: &mut RegistryEnv<'_>, args: AddArgs<'_>) -> Result<()> {
        let parent = env.storage.resolve(args.parent);
        let typename = subscribed_type(env.storage, &parent)?;
        let fields = args.selection.fields_for_type(typename.as_deref());

        for field in fields.values() {
            if !field.visible {
                continue;
            }
            let key = evaluate_key(&field.key_raw, args.variables);
            self.add_field_subscription(env.lifetimes, &parent, &key, args.spec, field.selection.clone());

            if field.list.is_some() {
                let parent_type = args.parent_type.unwrap_or(args.spec.root_type.as_str());
                self.register_list(env, &parent, &key, field, args.variables, parent_type);
            }

            let Some(inner) = field.selection.as_deref() else {
                continue;
            };
            for child in env.storage.linked_ids(&parent, &key) {
                self.add(
                    env,
                    AddArgs {
                        parent: &child,
                        spec: args.spec,
                        selection: inner,
                        variables: args.variables,
                        parent_type: Some(field.type_name.as_str()),
                    },
                )?;
            }
        }

        Ok(())
    }

    /// Subscribes several specs to a freshly linked record in one traversal.
    ///
    /// Each subscriber carries the selection it applies to `parent`, as
    /// returned by [`get`](Self::get) for the field that now links to it.
    /// References are counted per path, as in [`add`](Self::add).
    pub fn add_many(
        &mut self,
        env: &mut RegistryEnv<'_>,
        parent: &str,
        variables: &Variables,
        subscribers: &[SubscriberSelection],
        parent_type: Option<&str>,
    ) -> Result<()> {
        let parent = env.storage.resolve(parent);
        let typename = subscribed_type(env.storage, &parent)?;
        // (child, child type) → subscribers that reach it, once per path
        let mut children: IndexMap<(RecordId, String), Vec<SubscriberSelection>> = IndexMap::new();

        for (spec, target) in subscribers {
            let Some(target) = target else {
                continue;
            };
            let fields = target.fields_for_type(typename.as_deref());

            for field in fields.values() {
                if !field.visible {
                    continue;
                }
                let key = evaluate_key(&field.key_raw, variables);
                self.add_field_subscription(env.lifetimes, &parent, &key, spec, field.selection.clone());

                if field.list.is_some() {
                    let list_parent = parent_type.unwrap_or(spec.root_type.as_str());
                    self.register_list(env, &parent, &key, field, variables, list_parent);
                }

                let Some(inner) = field.selection.as_ref() else {
                    continue;
                };
                for child in env.storage.linked_ids(&parent, &key) {
                    children
                        .entry((child, field.type_name.clone()))
                        .or_default()
                        .push((spec.clone(), Some(inner.clone())));
                }
            }
        }

        for ((child, child_type), subscribers) in children {
            self.add_many(env, &child, variables, &subscribers, Some(child_type.as_str()))?;
        }

        Ok(())
    }

    fn add_field_subscription(
        &mut self,
        lifetimes: &mut dyn LifetimeTracker,
        id: &str,
        key: &str,
        spec: &Rc<SubscriptionSpec>,
        child_selection: Option<Rc<Selection>>,
    ) {
        let field = self
            .subscribers
            .entry(id.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default();

        self.key_versions
            .entry(key.to_string())
            .or_default()
            .insert(key.to_string());

        let handle = spec.handle();
        if !field.selections.iter().any(|(s, _)| s.handle() == handle) {
            field.selections.push((spec.clone(), child_selection));
        }
        *field.reference_counts.entry(handle).or_insert(0) += 1;

        tracing::trace!(record = id, key, handle, "field subscription added");
        lifetimes.reset_lifetime(id, key);
    }

    fn register_list(
        &mut self,
        env: &mut RegistryEnv<'_>,
        id: &str,
        key: &str,
        field: &FieldSelection,
        variables: &Variables,
        parent_type: &str,
    ) {
        let Some(list) = field.list.as_ref() else {
            return;
        };
        let filters = field
            .filters
            .iter()
            .flatten()
            .map(|(name, filter)| (name.clone(), filter.resolve(variables)))
            .collect();

        env.lists.add(ListRegistration {
            name: list.name.clone(),
            connection: list.connection,
            record_id: id.to_string(),
            record_type: env
                .storage
                .typename(id)
                .unwrap_or_else(|| parent_type.to_string()),
            list_type: list.list_type.clone(),
            key: key.to_string(),
            selection: field.selection.clone(),
            filters,
        });
    }

    /// Records the variables `spec` is subscribed with.
    ///
    /// Each bind must be paired with an [`unbind`](Self::unbind); the latest
    /// variables win while any bind is live.
    pub fn bind(&mut self, spec: &SubscriptionSpec, variables: &Variables) {
        let binding = self
            .bindings
            .entry(spec.handle())
            .or_insert_with(|| (Variables::new(), 0));
        binding.0 = variables.clone();
        binding.1 += 1;
    }

    /// Releases one bind of `spec`.
    pub fn unbind(&mut self, spec: &SubscriptionSpec) {
        let handle = spec.handle();
        let Some(binding) = self.bindings.get_mut(&handle) else {
            return;
        };
        binding.1 = binding.1.saturating_sub(1);
        if binding.1 == 0 {
            self.bindings.remove(&handle);
        }
    }

    /// Returns the variables `spec` was bound with, or its own variables.
    pub fn variables_for<'a>(&'a self, spec: &'a SubscriptionSpec) -> &'a Variables {
        self.bindings
            .get(&spec.handle())
            .map(|(variables, _)| variables)
            .unwrap_or(&spec.variables)
    }

    /// Returns a snapshot of the subscribers of one field.
    pub fn get(&self, id: &str, key: &str) -> Vec<SubscriberSelection> {
        self.subscribers
            .get(id)
            .and_then(|fields| fields.get(key))
            .map(|field| field.selections.clone())
            .unwrap_or_default()
    }

    /// Returns a snapshot of the subscribers of every field of a record.
    pub fn get_all(&self, id: &str) -> Vec<SubscriberSelection> {
        self.subscribers
            .get(id)
            .map(|fields| {
                fields
                    .values()
                    .flat_map(|field| field.selections.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the field keys of a record that have subscribers.
    pub fn active_fields(&self, id: &str) -> Vec<FieldKey> {
        self.subscribers
            .get(id)
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the reference count of a spec on one field.
    pub fn reference_count(&self, id: &str, key: &str, handle: SubscriptionHandle) -> usize {
        self.subscribers
            .get(id)
            .and_then(|fields| fields.get(key))
            .and_then(|field| field.reference_counts.get(&handle))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the versions recorded for a field key.
    pub fn key_versions(&self, key: &str) -> Option<&HashSet<FieldKey>> {
        self.key_versions.get(key)
    }

    /// Unsubscribes `targets` from every field reachable from `id` through
    /// `selection`, following the links currently in storage.
    ///
    /// One reference is dropped per path walked. `visited` guards the
    /// current path against link cycles.
    pub fn remove(
        &mut self,
        storage: &dyn RecordStorage,
        id: &str,
        selection: &Rc<Selection>,
        targets: &[Rc<SubscriptionSpec>],
        variables: &Variables,
        visited: &mut Visited,
    ) {
        let mut work = vec![Step::Enter(storage.resolve(id), selection)];

        while let Some(step) = work.pop() {
            let (record, selection) = match step {
                Step::Leave(record, selection) => {
                    visited.leave(&record, selection);
                    continue;
                }
                Step::Enter(record, selection) => (record, selection),
            };
            if !visited.enter(&record, selection) {
                tracing::trace!(record = %record, "link cycle skipped");
                continue;
            }
            work.push(Step::Leave(record.clone(), selection));

            let typename = storage.typename(&record);
            let fields = selection.fields_for_type(typename.as_deref());
            for field in fields.values() {
                let key = evaluate_key(&field.key_raw, variables);
                self.remove_subscribers(&record, &key, targets);

                let Some(inner) = field.selection.as_ref() else {
                    continue;
                };
                for link in storage.linked_ids(&record, &key) {
                    work.push(Step::Enter(link, inner));
                }
            }
        }
    }

    fn remove_subscribers(&mut self, id: &str, key: &str, targets: &[Rc<SubscriptionSpec>]) {
        let Some(fields) = self.subscribers.get_mut(id) else {
            return;
        };

        if let Some(field) = fields.get_mut(key) {
            let mut dropped = Vec::new();
            for spec in targets {
                let handle = spec.handle();
                let Some(count) = field.reference_counts.get_mut(&handle) else {
                    continue;
                };
                *count = count.saturating_sub(1);
                if *count == 0 {
                    field.reference_counts.remove(&handle);
                    dropped.push(handle);
                }
            }
            if !dropped.is_empty() {
                field
                    .selections
                    .retain(|(spec, _)| !dropped.contains(&spec.handle()));
            }
            if field.reference_counts.is_empty() {
                fields.remove(key);
            }
        }

        if fields.is_empty() {
            self.subscribers.remove(id);
        }
    }

    /// Drops subscriptions reaching `id`.
    ///
    /// Without `targets`, every spec subscribed anywhere on `id` is dropped.
    /// Each target is removed along every path from its own parent record to
    /// `id`, so records reached through several parents are handled.
    pub fn remove_all_subscribers(
        &mut self,
        storage: &dyn RecordStorage,
        id: &str,
        targets: Option<&[Rc<SubscriptionSpec>]>,
    ) {
        let id = storage.resolve(id);
        let targets = match targets {
            Some(targets) => targets.to_vec(),
            None => self.distinct_specs(&id),
        };

        for target in &targets {
            let variables = self.variables_for(target).clone();
            let paths = self.find_sub_selections(storage, target.parent_id(), &target.selection, &variables, &id);
            for selection in paths {
                self.remove(
                    storage,
                    &id,
                    &selection,
                    core::slice::from_ref(target),
                    &variables,
                    &mut Visited::new(),
                );
            }
        }
    }

    fn distinct_specs(&self, id: &str) -> Vec<Rc<SubscriptionSpec>> {
        let mut seen = HashSet::new();
        self.get_all(id)
            .into_iter()
            .filter(|(spec, _)| seen.insert(spec.handle()))
            .map(|(spec, _)| spec)
            .collect()
    }

    /// Finds the selections applied to `search_target` along every path from
    /// `parent_id` through `selection`, one per path.
    pub fn find_sub_selections(
        &self,
        storage: &dyn RecordStorage,
        parent_id: &str,
        selection: &Rc<Selection>,
        variables: &Variables,
        search_target: &str,
    ) -> Vec<Rc<Selection>> {
        let search_target = storage.resolve(search_target);
        let mut found = Vec::new();
        let mut visited = Visited::new();
        let mut work = vec![Step::Enter(storage.resolve(parent_id), selection)];

        while let Some(step) = work.pop() {
            let (record, selection) = match step {
                Step::Leave(record, selection) => {
                    visited.leave(&record, selection);
                    continue;
                }
                Step::Enter(record, selection) => (record, selection),
            };
            if !visited.enter(&record, selection) {
                continue;
            }
            work.push(Step::Leave(record.clone(), selection));

            let typename = storage.typename(&record);
            let fields = selection.fields_for_type(typename.as_deref());
            for field in fields.values() {
                let Some(inner) = field.selection.as_ref() else {
                    continue;
                };
                let key = evaluate_key(&field.key_raw, variables);
                let links = storage.linked_ids(&record, &key);
                let hits = links.iter().filter(|link| **link == search_target).count();
                if hits > 0 {
                    found.extend(core::iter::repeat(inner.clone()).take(hits));
                } else {
                    work.extend(links.into_iter().map(|link| Step::Enter(link, inner)));
                }
            }
        }

        found
    }

    /// Drops every subscriber of records outside the root and returns the
    /// distinct specs that were dropped.
    ///
    /// Variable bindings are kept: the dropped specs are still subscribed
    /// from their owner's point of view.
    pub fn reset(&mut self) -> Vec<Rc<SubscriptionSpec>> {
        let dropped: Vec<RecordId> = self
            .subscribers
            .keys()
            .filter(|id| !is_root_scoped(id))
            .cloned()
            .collect();

        let mut seen = HashSet::new();
        let mut specs = Vec::new();
        for id in dropped {
            let Some(fields) = self.subscribers.remove(&id) else {
                continue;
            };
            for field in fields.values() {
                for (spec, _) in &field.selections {
                    if seen.insert(spec.handle()) {
                        specs.push(spec.clone());
                    }
                }
            }
        }

        tracing::debug!(dropped = specs.len(), "subscription registry reset");
        specs
    }

    /// Returns the total live reference count.
    pub fn size(&self) -> usize {
        self.subscribers
            .values()
            .flat_map(|fields| fields.values())
            .map(|field| field.reference_counts.values().sum::<usize>())
            .sum()
    }

    /// Returns the number of records with subscribers.
    pub fn record_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns true if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
