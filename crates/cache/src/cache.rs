//! Cache - Normalized record cache with subscription-driven notifications.
//!
//! This module provides the `Cache` struct which normalizes response
//! payloads into records, reads selections back out of them, and keeps
//! subscriptions attached to the fields they render.

use hashbrown::HashSet;
use indexmap::IndexSet;
use serde_json::{Map, Value};
use std::rc::Rc;
use tessera_core::{
    evaluate_key, CacheConfig, FieldKey, LifetimeTracker, LinkValue, ListRegistry, RecordId,
    RecordStorage, Result, Selection, StoredValue, Variables, ROOT_ID,
};
use tessera_optimistic::IdentityReconciler;
use tessera_reactive::{
    AddArgs, RegistryEnv, SubscriberSelection, SubscriptionRegistry, SubscriptionSpec, Visited,
};
use tessera_storage::{InMemoryStorage, LifetimeCounter, RecordingLists};

/// Arguments of [`Cache::write`].
#[derive(Clone, Copy)]
pub struct WriteArgs<'a> {
    pub selection: &'a Selection,
    pub data: &'a Value,
    pub variables: &'a Variables,
    /// Record the payload is written under; the root record when `None`.
    pub parent: Option<&'a str>,
}

/// Value read for a selection.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadResult {
    pub data: Value,
    /// True if at least one selected field is missing from storage.
    pub partial: bool,
}

/// A linked field whose value changed during a write.
struct Relink {
    record: RecordId,
    key: FieldKey,
    field_type: String,
    previous: Option<LinkValue>,
    current: LinkValue,
}

#[derive(Default)]
struct WriteChanges {
    touched: IndexSet<(RecordId, FieldKey)>,
    relinked: Vec<Relink>,
}

/// The normalized cache.
///
/// Owns the record storage, the list registry, the lifetime tracker and the
/// subscription registry of one cache instance.
pub struct Cache<S = InMemoryStorage> {
    config: Rc<CacheConfig>,
    storage: S,
    lists: RecordingLists,
    lifetimes: LifetimeCounter,
    subscriptions: SubscriptionRegistry,
}

impl Cache<InMemoryStorage> {
    /// Creates a cache backed by in-memory storage.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_storage(config, InMemoryStorage::new())
    }
}

impl Default for Cache<InMemoryStorage> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<S: RecordStorage> Cache<S> {
    /// Creates a cache over the given storage.
    pub fn with_storage(config: CacheConfig, storage: S) -> Self {
        Self {
            config: Rc::new(config),
            storage,
            lists: RecordingLists::new(),
            lifetimes: LifetimeCounter::new(),
            subscriptions: SubscriptionRegistry::new(),
        }
    }

    pub fn config(&self) -> &Rc<CacheConfig> {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn lists(&self) -> &RecordingLists {
        &self.lists
    }

    pub fn lifetimes(&self) -> &LifetimeCounter {
        &self.lifetimes
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// Subscribes a spec to the fields its selection reaches.
    ///
    /// `variables` stay bound to the spec until it is unsubscribed: later
    /// relinks and notifications evaluate its keys with them.
    pub fn subscribe(&mut self, spec: &Rc<SubscriptionSpec>, variables: &Variables) -> Result<()> {
        let mut env = RegistryEnv {
            storage: &self.storage,
            lists: &mut self.lists,
            lifetimes: &mut self.lifetimes,
        };
        self.subscriptions.add(
            &mut env,
            AddArgs {
                parent: spec.parent_id(),
                spec,
                selection: &spec.selection,
                variables,
                parent_type: Some(spec.root_type.as_str()),
            },
        )?;
        self.subscriptions.bind(spec, variables);
        tracing::debug!(handle = spec.handle(), parent = spec.parent_id(), "subscribed");
        Ok(())
    }

    /// Removes a spec subscribed with the same variables.
    pub fn unsubscribe(&mut self, spec: &Rc<SubscriptionSpec>, variables: &Variables) {
        let mut visited = Visited::new();
        self.subscriptions.remove(
            &self.storage,
            spec.parent_id(),
            &spec.selection,
            core::slice::from_ref(spec),
            variables,
            &mut visited,
        );
        self.subscriptions.unbind(spec);
        tracing::debug!(
            handle = spec.handle(),
            parent = spec.parent_id(),
            walked = visited.walked(),
            "unsubscribed"
        );
    }

    /// Writes a payload and notifies every spec observing a changed field.
    ///
    /// Storage is fully updated before subscriptions follow the new links,
    /// and each affected spec is notified once with a fresh read.
    pub fn write(&mut self, args: WriteArgs<'_>) -> Result<()> {
        let parent = args.parent.unwrap_or(ROOT_ID);
        let Some(data) = args.data.as_object() else {
            return Ok(());
        };

        let mut changes = WriteChanges::default();
        self.write_record(parent, args.selection, data, args.variables, &mut changes);
        self.move_subscribers(&changes.relinked)?;

        let specs = self.affected_specs(&changes.touched);
        tracing::debug!(
            parent,
            fields = changes.touched.len(),
            notified = specs.len(),
            "cache write"
        );
        self.notify(&specs);
        Ok(())
    }

    fn write_record(
        &mut self,
        id: &str,
        selection: &Selection,
        data: &Map<String, Value>,
        variables: &Variables,
        changes: &mut WriteChanges,
    ) {
        let typename = data
            .get("__typename")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.storage.typename(id));
        let fields = selection.fields_for_type(typename.as_deref());

        for (name, field) in fields {
            let Some(value) = data.get(name) else {
                continue;
            };
            let key = evaluate_key(&field.key_raw, variables);
            let stored = match field.selection.as_deref() {
                None => StoredValue::Scalar(value.clone()),
                Some(inner) => {
                    let embedded = format!("{}.{}", id, key);
                    StoredValue::Link(self.write_link(embedded, &field.type_name, inner, value, variables, changes))
                }
            };
            self.set_field(id, &key, stored, &field.type_name, changes);
        }
    }

    fn write_link(
        &mut self,
        embedded_id: String,
        field_type: &str,
        selection: &Selection,
        value: &Value,
        variables: &Variables,
        changes: &mut WriteChanges,
    ) -> LinkValue {
        match value {
            Value::Array(items) => LinkValue::List(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let item_id = format!("{}[{}]", embedded_id, index);
                        self.write_link(item_id, field_type, selection, item, variables, changes)
                    })
                    .collect(),
            ),
            Value::Object(object) => {
                let typename = object
                    .get("__typename")
                    .and_then(Value::as_str)
                    .unwrap_or(field_type)
                    .to_string();
                let child = self.config.record_id(&typename, value).unwrap_or(embedded_id);
                self.set_field(&child, "__typename", StoredValue::Scalar(Value::String(typename)), "String", changes);
                self.write_record(&child, selection, object, variables, changes);
                LinkValue::Record(child)
            }
            _ => LinkValue::Null,
        }
    }

    fn set_field(&mut self, id: &str, key: &str, value: StoredValue, field_type: &str, changes: &mut WriteChanges) {
        let id = self.storage.resolve(id);
        let previous = self.storage.get(&id, key);
        if previous.as_ref() == Some(&value) {
            return;
        }
        if let StoredValue::Link(current) = &value {
            changes.relinked.push(Relink {
                record: id.clone(),
                key: key.to_string(),
                field_type: field_type.to_string(),
                previous: previous.as_ref().and_then(StoredValue::as_link).cloned(),
                current: current.clone(),
            });
        }
        self.storage.set(&id, key, value);
        changes.touched.insert((id, key.to_string()));
    }

    /// Moves the subscribers of relinked fields from the records they no
    /// longer link to onto the records they link to now.
    ///
    /// Links are compared by resolved id, so relinking onto an alias of the
    /// same record moves nothing.
    fn move_subscribers(&mut self, relinked: &[Relink]) -> Result<()> {
        for relink in relinked {
            let subscribers = self.subscriptions.get(&relink.record, &relink.key);
            if subscribers.is_empty() {
                continue;
            }
            let current = self.resolved_ids(Some(&relink.current));
            let previous = self.resolved_ids(relink.previous.as_ref());

            for old in removed_links(&previous, &current) {
                for (spec, selection) in &subscribers {
                    let Some(selection) = selection else {
                        continue;
                    };
                    let variables = self.subscriptions.variables_for(spec).clone();
                    self.subscriptions.remove(
                        &self.storage,
                        &old,
                        selection,
                        core::slice::from_ref(spec),
                        &variables,
                        &mut Visited::new(),
                    );
                }
            }

            let added = removed_links(&current, &previous);
            if added.is_empty() {
                continue;
            }
            for (variables, group) in group_by_variables(&self.subscriptions, &subscribers) {
                for id in &added {
                    let mut env = RegistryEnv {
                        storage: &self.storage,
                        lists: &mut self.lists,
                        lifetimes: &mut self.lifetimes,
                    };
                    self.subscriptions
                        .add_many(&mut env, id, &variables, &group, Some(relink.field_type.as_str()))?;
                }
            }
        }
        Ok(())
    }

    fn resolved_ids(&self, link: Option<&LinkValue>) -> Vec<RecordId> {
        link.map(LinkValue::flatten)
            .unwrap_or_default()
            .iter()
            .map(|id| self.storage.resolve(id))
            .collect()
    }

    fn affected_specs(&self, touched: &IndexSet<(RecordId, FieldKey)>) -> Vec<Rc<SubscriptionSpec>> {
        let mut seen = HashSet::new();
        let mut specs = Vec::new();
        for (id, key) in touched {
            for (spec, _) in self.subscriptions.get(id, key) {
                if seen.insert(spec.handle()) {
                    specs.push(spec);
                }
            }
        }
        specs
    }

    fn notify(&self, specs: &[Rc<SubscriptionSpec>]) {
        for spec in specs {
            let variables = self.subscriptions.variables_for(spec);
            let result = self.read(&spec.selection, Some(spec.parent_id()), variables);
            spec.set(&result.data);
        }
    }

    /// Reads a selection starting at `parent`, the root record when `None`.
    pub fn read(&self, selection: &Selection, parent: Option<&str>, variables: &Variables) -> ReadResult {
        let mut partial = false;
        let data = self.read_record(parent.unwrap_or(ROOT_ID), selection, variables, &mut partial);
        ReadResult { data, partial }
    }

    fn read_record(&self, id: &str, selection: &Selection, variables: &Variables, partial: &mut bool) -> Value {
        let typename = self.storage.typename(id);
        let fields = selection.fields_for_type(typename.as_deref());

        let mut object = Map::new();
        for (name, field) in fields {
            if !field.visible {
                continue;
            }
            let key = evaluate_key(&field.key_raw, variables);
            let value = match self.storage.get(id, &key) {
                None => {
                    *partial = true;
                    Value::Null
                }
                Some(StoredValue::Scalar(value)) => value,
                Some(StoredValue::Link(link)) => match field.selection.as_deref() {
                    Some(inner) => self.read_link(&link, inner, variables, partial),
                    None => Value::Null,
                },
            };
            object.insert(name.clone(), value);
        }
        Value::Object(object)
    }

    fn read_link(&self, link: &LinkValue, selection: &Selection, variables: &Variables, partial: &mut bool) -> Value {
        match link {
            LinkValue::Null => Value::Null,
            LinkValue::Record(id) => self.read_record(id, selection, variables, partial),
            LinkValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.read_link(item, selection, variables, partial))
                    .collect(),
            ),
        }
    }

    /// Makes `source` an alias of `target`.
    ///
    /// Subscriptions are keyed by resolved id, so the subscribers of `target`
    /// observe writes made through `source` without being copied.
    pub fn register_key_map(&mut self, source: &str, target: &str) {
        self.storage.register_key_map(source, target);
    }

    /// Clears every record and notifies the specs that observed them.
    ///
    /// Subscriptions rooted at the root record stay registered.
    pub fn reset(&mut self) {
        let dropped = self.subscriptions.reset();
        self.lists.clear();
        self.lifetimes.clear();
        self.storage.clear();
        tracing::debug!(dropped = dropped.len(), "cache reset");
        self.notify(&dropped);
    }
}

impl<S: RecordStorage> IdentityReconciler for Cache<S> {
    fn register_key_map(&mut self, source: &str, target: &str) {
        Cache::register_key_map(self, source, target);
    }

    fn write_fields(&mut self, record: &str, fields: &[(String, Value)]) -> Result<()> {
        let mut changes = WriteChanges::default();
        for (key, value) in fields {
            self.set_field(record, key, StoredValue::Scalar(value.clone()), "", &mut changes);
        }
        let specs = self.affected_specs(&changes.touched);
        self.notify(&specs);
        Ok(())
    }
}

/// Returns the links of `from` missing from `to`, keeping duplicates that
/// `to` holds fewer times.
fn removed_links(from: &[RecordId], to: &[RecordId]) -> Vec<RecordId> {
    let mut remaining = to.to_vec();
    from.iter()
        .filter(|id| match remaining.iter().position(|other| other == *id) {
            Some(index) => {
                remaining.swap_remove(index);
                false
            }
            None => true,
        })
        .cloned()
        .collect()
}

/// Groups subscribers by the variables bound to their spec.
fn group_by_variables(
    registry: &SubscriptionRegistry,
    subscribers: &[SubscriberSelection],
) -> Vec<(Variables, Vec<SubscriberSelection>)> {
    let mut groups: Vec<(Variables, Vec<SubscriberSelection>)> = Vec::new();
    for subscriber in subscribers {
        let bound = registry.variables_for(&subscriber.0);
        match groups.iter_mut().find(|(variables, _)| variables == bound) {
            Some((_, group)) => group.push(subscriber.clone()),
            None => groups.push((bound.clone(), vec![subscriber.clone()])),
        }
    }
    groups
}
