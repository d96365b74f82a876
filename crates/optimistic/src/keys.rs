//! Optimistic key reconciliation.
//!
//! A mutation's optimistic response flows through the normal write path even
//! though some of its identities are not known yet. `OptimisticKeyManager`
//! fills those identities with placeholders when the mutation starts, holds
//! back any request whose variables still reference a placeholder, and once
//! the server responds swaps every placeholder for the real value.
//!
//! Per-invocation state lives from `start` to `end`. Resolver callbacks of
//! placeholders that were never resolved outlive the invocation: requests
//! waiting on them stay suspended.

use crate::placeholder::{placeholder_key, PlaceholderGenerator};
use core::cell::RefCell;
use hashbrown::HashMap;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::rc::Rc;
use tessera_core::{Artifact, CacheConfig, RecordId, Result, Selection, Variables};

/// Identity of one mutation invocation.
pub type MutationId = u64;

/// Resolver invoked once with the real value of a placeholder.
pub type KeyCallback = Box<dyn FnOnce(&Value)>;

/// Applies identity changes discovered after a mutation response.
pub trait IdentityReconciler {
    /// Makes `source` resolve to the record stored under `target`.
    fn register_key_map(&mut self, source: &str, target: &str);

    /// Writes scalar fields into a record.
    fn write_fields(&mut self, record: &str, fields: &[(String, Value)]) -> Result<()>;
}

/// Outcome of [`OptimisticKeyManager::before_network`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The request was released immediately.
    Ready,
    /// The request waits for these placeholders.
    Suspended { pending: Vec<String> },
}

/// A request held back until its placeholders resolve.
struct PendingRequest {
    variables: Variables,
    resolved: HashMap<String, Option<Value>>,
    release: Option<Box<dyn FnOnce(Variables)>>,
}

impl PendingRequest {
    fn resolve(request: &Rc<RefCell<PendingRequest>>, key: &str, real: &Value) {
        let ready = {
            let mut pending = request.borrow_mut();
            pending.resolved.insert(key.to_string(), Some(real.clone()));
            if pending.resolved.values().all(Option::is_some) {
                pending.release.take().map(|release| {
                    let replacements: HashMap<String, Value> = pending
                        .resolved
                        .iter()
                        .filter_map(|(k, v)| v.clone().map(|v| (k.clone(), v)))
                        .collect();
                    let mut variables = core::mem::take(&mut pending.variables);
                    for value in variables.values_mut() {
                        replace_keys(value, &replacements);
                    }
                    (release, variables)
                })
            } else {
                None
            }
        };

        if let Some((release, variables)) = ready {
            release(variables);
        }
    }
}

/// A record whose identity changed once the server responded.
#[derive(Clone, Debug, PartialEq)]
struct IdentityChange {
    real_id: RecordId,
    optimistic_id: RecordId,
    fields: Vec<(String, Value)>,
}

/// Placeholder bookkeeping for one cache instance.
pub struct OptimisticKeyManager {
    config: Rc<CacheConfig>,
    /// Placeholder → resolvers waiting for its real value.
    callbacks: HashMap<String, Vec<KeyCallback>>,
    /// Mutation → response path → placeholder.
    key_store: HashMap<MutationId, IndexMap<String, Value>>,
    /// Mutation → placeholder → id of the object containing it.
    object_ids: HashMap<MutationId, HashMap<String, RecordId>>,
    next_mutation: MutationId,
    generator: PlaceholderGenerator,
}

impl OptimisticKeyManager {
    /// Creates a manager computing identities with the given configuration.
    pub fn new(config: Rc<CacheConfig>) -> Self {
        Self {
            config,
            callbacks: HashMap::new(),
            key_store: HashMap::new(),
            object_ids: HashMap::new(),
            next_mutation: 1,
            generator: PlaceholderGenerator::new(),
        }
    }

    /// Fills the optimistic keys of a mutation's optimistic response.
    ///
    /// Returns the invocation id when the artifact is a mutation declaring
    /// optimistic keys and an optimistic response was supplied.
    pub fn start(
        &mut self,
        artifact: &Artifact,
        optimistic_response: Option<&mut Value>,
    ) -> Result<Option<MutationId>> {
        let Some(response) = optimistic_response else {
            return Ok(None);
        };
        if !artifact.is_mutation() || !artifact.optimistic_keys {
            return Ok(None);
        }

        let mutation = self.next_mutation;
        self.next_mutation += 1;

        if let Err(err) = self.add_keys_to_response(mutation, &artifact.selection, response, "", "") {
            self.discard(mutation);
            return Err(err);
        }
        Ok(Some(mutation))
    }

    fn add_keys_to_response(
        &mut self,
        mutation: MutationId,
        selection: &Selection,
        response: &mut Value,
        path: &str,
        type_name: &str,
    ) -> Result<()> {
        let Some(object) = response.as_object_mut() else {
            return Ok(());
        };
        let typename = object
            .get("__typename")
            .and_then(Value::as_str)
            .map(str::to_string);
        let fields = selection.fields_for_type(typename.as_deref());

        let mut new_keys = Vec::new();
        for (name, field) in fields {
            let path_so_far = format!("{}.{}", path, name);

            if field.optimistic_key {
                let key_value = match object.get(name) {
                    Some(value) if !value.is_null() => value.clone(),
                    _ => self.generator.generate(&field.type_name)?,
                };
                object.insert(name.clone(), key_value.clone());

                if let Some(key) = placeholder_key(&key_value) {
                    tracing::debug!(mutation, path = %path_so_far, placeholder = %key, "optimistic key allocated");
                    self.callbacks.entry(key.clone()).or_default();
                    self.key_store
                        .entry(mutation)
                        .or_default()
                        .insert(path_so_far.clone(), key_value);
                    new_keys.push(key);
                }
            }

            let Some(inner) = field.selection.as_deref() else {
                continue;
            };
            match object.get_mut(name) {
                Some(Value::Array(items)) => {
                    for (index, item) in flatten_list_mut(items).into_iter().enumerate() {
                        if item.is_object() {
                            let item_path = format!("{}[{}]", path_so_far, index);
                            self.add_keys_to_response(mutation, inner, item, &item_path, &field.type_name)?;
                        }
                    }
                }
                Some(value) if value.is_object() => {
                    self.add_keys_to_response(mutation, inner, value, &path_so_far, &field.type_name)?;
                }
                _ => {}
            }
        }

        if !new_keys.is_empty() {
            let object_id = format!(
                "{}:{}",
                type_name,
                self.config.compute_id(type_name, response).unwrap_or_default()
            );
            let ids = self.object_ids.entry(mutation).or_default();
            for key in new_keys {
                ids.insert(key, object_id.clone());
            }
        }

        Ok(())
    }

    /// Releases a request, or holds it back while its variables reference
    /// unresolved placeholders.
    ///
    /// `release` runs exactly once: immediately, or after the last pending
    /// placeholder resolves, with every placeholder replaced by its real value.
    pub fn before_network<F>(&mut self, variables: Variables, release: F) -> Dispatch
    where
        F: FnOnce(Variables) + 'static,
    {
        let pending = if self.callbacks.is_empty() {
            IndexSet::new()
        } else {
            let mut found = IndexSet::new();
            for value in variables.values() {
                extract_input_keys(value, &self.callbacks, &mut found);
            }
            found
        };

        if pending.is_empty() {
            release(variables);
            return Dispatch::Ready;
        }

        let request = Rc::new(RefCell::new(PendingRequest {
            variables,
            resolved: pending.iter().map(|k| (k.clone(), None)).collect(),
            release: Some(Box::new(release)),
        }));

        for key in &pending {
            let request = request.clone();
            let resolved_key = key.clone();
            if let Some(callbacks) = self.callbacks.get_mut(key) {
                callbacks.push(Box::new(move |real: &Value| {
                    PendingRequest::resolve(&request, &resolved_key, real);
                }));
            }
        }

        tracing::debug!(pending = pending.len(), "request suspended on optimistic keys");
        Dispatch::Suspended {
            pending: pending.into_iter().collect(),
        }
    }

    /// Reconciles placeholders with the real values of a mutation response.
    ///
    /// Every resolver queued on a matched placeholder runs once with the real
    /// value. Records created under a placeholder identity are aliased from
    /// their real identity and receive the real key fields.
    pub fn after_network(
        &mut self,
        mutation: Option<MutationId>,
        artifact: &Artifact,
        data: &Value,
        target: &mut dyn IdentityReconciler,
    ) -> Result<()> {
        let Some(mutation) = mutation else {
            return Ok(());
        };
        if !artifact.is_mutation() || !artifact.optimistic_keys {
            return Ok(());
        }

        let mut fired = Vec::new();
        let mut changes = Vec::new();
        self.extract_response_keys(mutation, &artifact.selection, data, "", "", &mut fired, &mut changes);

        for (callbacks, real) in fired {
            for callback in callbacks {
                callback(&real);
            }
        }
        for change in changes {
            tracing::debug!(real = %change.real_id, optimistic = %change.optimistic_id, "optimistic identity reconciled");
            target.register_key_map(&change.real_id, &change.optimistic_id);
            target.write_fields(&change.optimistic_id, &change.fields)?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_response_keys(
        &mut self,
        mutation: MutationId,
        selection: &Selection,
        response: &Value,
        path: &str,
        type_name: &str,
        fired: &mut Vec<(Vec<KeyCallback>, Value)>,
        changes: &mut Vec<IdentityChange>,
    ) {
        let Some(object) = response.as_object() else {
            return;
        };
        let typename = object.get("__typename").and_then(Value::as_str);
        let fields = selection.fields_for_type(typename);

        let mut optimistic_id = None;
        for (name, value) in object {
            let path_so_far = format!("{}.{}", path, name);

            let placeholder = match value {
                Value::String(_) | Value::Number(_) => self
                    .key_store
                    .get(&mutation)
                    .and_then(|keys| keys.get(&path_so_far))
                    .and_then(placeholder_key),
                _ => None,
            };
            if let Some(key) = placeholder {
                tracing::debug!(mutation, placeholder = %key, real = %value, "optimistic key resolved");
                let callbacks = self.callbacks.remove(&key).unwrap_or_default();
                fired.push((callbacks, value.clone()));
                if let Some(id) = self.object_ids.get(&mutation).and_then(|ids| ids.get(&key)) {
                    optimistic_id = Some(id.clone());
                }
            }

            let Some(field) = fields.get(name) else {
                continue;
            };
            let Some(inner) = field.selection.as_deref() else {
                continue;
            };
            let field_type = field.type_name.as_str();
            match value {
                Value::Array(items) => {
                    for (index, item) in flatten_list(items).into_iter().enumerate() {
                        if item.is_object() {
                            let item_path = format!("{}[{}]", path_so_far, index);
                            self.extract_response_keys(mutation, inner, item, &item_path, field_type, fired, changes);
                        }
                    }
                }
                Value::Object(_) => {
                    self.extract_response_keys(mutation, inner, value, &path_so_far, field_type, fired, changes);
                }
                _ => {}
            }
        }

        if let Some(optimistic_id) = optimistic_id {
            let real_id = format!(
                "{}:{}",
                type_name,
                self.config.compute_id(type_name, response).unwrap_or_default()
            );
            let fields = self
                .config
                .key_fields_for_type(type_name)
                .iter()
                .filter_map(|key| object.get(key).map(|v| (key.clone(), v.clone())))
                .collect();
            changes.push(IdentityChange {
                real_id,
                optimistic_id,
                fields,
            });
        }
    }

    /// Clears the per-invocation state of a mutation.
    pub fn end(&mut self, mutation: Option<MutationId>) {
        let Some(mutation) = mutation else {
            return;
        };
        if let Some(keys) = self.key_store.remove(&mutation) {
            let unresolved = keys
                .values()
                .filter_map(placeholder_key)
                .filter(|key| self.callbacks.contains_key(key))
                .count();
            if unresolved > 0 {
                tracing::warn!(mutation, unresolved, "mutation ended with unresolved optimistic keys");
            }
        }
        self.object_ids.remove(&mutation);
    }

    fn discard(&mut self, mutation: MutationId) {
        if let Some(keys) = self.key_store.remove(&mutation) {
            for key in keys.values().filter_map(placeholder_key) {
                self.callbacks.remove(&key);
            }
        }
        self.object_ids.remove(&mutation);
    }

    /// Returns true if the value is a placeholder still awaiting resolution.
    pub fn is_pending(&self, value: &Value) -> bool {
        placeholder_key(value)
            .map(|key| self.callbacks.contains_key(&key))
            .unwrap_or(false)
    }

    /// Returns the number of placeholders awaiting resolution.
    pub fn pending_keys(&self) -> usize {
        self.callbacks.len()
    }

    /// Returns the placeholders allocated by a mutation, by response path.
    pub fn keys_for(&self, mutation: MutationId) -> Option<&IndexMap<String, Value>> {
        self.key_store.get(&mutation)
    }

    /// Returns the containing object of each placeholder of a mutation.
    pub fn object_ids_for(&self, mutation: MutationId) -> Option<&HashMap<String, RecordId>> {
        self.object_ids.get(&mutation)
    }
}

fn extract_input_keys(
    value: &Value,
    callbacks: &HashMap<String, Vec<KeyCallback>>,
    found: &mut IndexSet<String>,
) {
    match value {
        Value::String(_) | Value::Number(_) => {
            if let Some(key) = placeholder_key(value) {
                if callbacks.contains_key(&key) {
                    found.insert(key);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                extract_input_keys(item, callbacks, found);
            }
        }
        Value::Object(fields) => {
            for item in fields.values() {
                extract_input_keys(item, callbacks, found);
            }
        }
        _ => {}
    }
}

fn replace_keys(value: &mut Value, replacements: &HashMap<String, Value>) {
    match value {
        Value::String(_) | Value::Number(_) => {
            if let Some(real) = placeholder_key(value).and_then(|key| replacements.get(&key)) {
                *value = real.clone();
            }
        }
        Value::Array(items) => {
            for item in items {
                replace_keys(item, replacements);
            }
        }
        Value::Object(fields) => {
            for item in fields.values_mut() {
                replace_keys(item, replacements);
            }
        }
        _ => {}
    }
}

fn flatten_list(items: &[Value]) -> Vec<&Value> {
    let mut out = Vec::new();
    for item in items {
        match item {
            Value::Array(inner) => out.extend(flatten_list(inner)),
            other => out.push(other),
        }
    }
    out
}

fn flatten_list_mut(items: &mut [Value]) -> Vec<&mut Value> {
    let mut out = Vec::new();
    for item in items {
        if let Value::Array(inner) = item {
            out.extend(flatten_list_mut(inner));
        } else {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::{ArtifactKind, FieldSelection, RecordStorage, StoredValue};
    use tessera_storage::InMemoryStorage;

    #[derive(Default)]
    struct StorageTarget {
        storage: InMemoryStorage,
        key_maps: Vec<(String, String)>,
    }

    impl IdentityReconciler for StorageTarget {
        fn register_key_map(&mut self, source: &str, target: &str) {
            self.key_maps.push((source.to_string(), target.to_string()));
            self.storage.register_key_map(source, target);
        }

        fn write_fields(&mut self, record: &str, fields: &[(String, Value)]) -> Result<()> {
            for (key, value) in fields {
                self.storage.set(record, key, StoredValue::from(value.clone()));
            }
            Ok(())
        }
    }

    fn create_user_artifact() -> Artifact {
        let selection = Selection::new().field(
            "createUser",
            FieldSelection::linked(
                "createUser",
                "User",
                Selection::new()
                    .field("id", FieldSelection::scalar("id", "ID").as_optimistic_key())
                    .field("name", FieldSelection::scalar("name", "String")),
            ),
        );
        Artifact::new("CreateUser", ArtifactKind::Mutation, "Mutation", selection).with_optimistic_keys()
    }

    fn manager() -> OptimisticKeyManager {
        OptimisticKeyManager::new(Rc::new(CacheConfig::default()))
    }

    fn vars(value: Value) -> Variables {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_start_generates_placeholder() {
        let mut keys = manager();
        let artifact = create_user_artifact();
        let mut response = json!({ "createUser": { "name": "bob" } });

        let mutation = keys.start(&artifact, Some(&mut response)).unwrap().unwrap();

        let placeholder = response["createUser"]["id"].clone();
        assert!(placeholder.is_string());
        assert!(keys.is_pending(&placeholder));
        assert_eq!(keys.keys_for(mutation).unwrap().get(".createUser.id"), Some(&placeholder));

        let key = placeholder.as_str().unwrap().to_string();
        assert_eq!(
            keys.object_ids_for(mutation).unwrap().get(&key),
            Some(&format!("User:{}", key))
        );
    }

    #[test]
    fn test_start_keeps_supplied_value() {
        let mut keys = manager();
        let artifact = create_user_artifact();
        let mut response = json!({ "createUser": { "id": "supplied", "name": "bob" } });

        keys.start(&artifact, Some(&mut response)).unwrap();
        assert_eq!(response["createUser"]["id"], json!("supplied"));
        assert!(keys.is_pending(&json!("supplied")));
    }

    #[test]
    fn test_start_ignores_non_optimistic_documents() {
        let mut keys = manager();
        let mut artifact = create_user_artifact();
        let mut response = json!({ "createUser": { "name": "bob" } });
        assert_eq!(keys.start(&artifact, None).unwrap(), None);

        artifact.optimistic_keys = false;
        assert_eq!(keys.start(&artifact, Some(&mut response)).unwrap(), None);
        assert!(response["createUser"].get("id").is_none());
    }

    #[test]
    fn test_start_rejects_unsupported_type() {
        let mut keys = manager();
        let selection = Selection::new().field(
            "createEvent",
            FieldSelection::linked(
                "createEvent",
                "Event",
                Selection::new().field("at", FieldSelection::scalar("at", "DateTime").as_optimistic_key()),
            ),
        );
        let artifact =
            Artifact::new("CreateEvent", ArtifactKind::Mutation, "Mutation", selection).with_optimistic_keys();
        let mut response = json!({ "createEvent": {} });

        assert!(matches!(
            keys.start(&artifact, Some(&mut response)),
            Err(tessera_core::Error::UnsupportedOptimisticKey { .. })
        ));
        assert_eq!(keys.pending_keys(), 0);
    }

    #[test]
    fn test_start_paths_for_lists() {
        let mut keys = manager();
        let selection = Selection::new().field(
            "createUsers",
            FieldSelection::linked(
                "createUsers",
                "User",
                Selection::new().field("id", FieldSelection::scalar("id", "Int").as_optimistic_key()),
            ),
        );
        let artifact =
            Artifact::new("CreateUsers", ArtifactKind::Mutation, "Mutation", selection).with_optimistic_keys();
        let mut response = json!({ "createUsers": [{}, [{}]] });

        let mutation = keys.start(&artifact, Some(&mut response)).unwrap().unwrap();
        let stored = keys.keys_for(mutation).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.contains_key(".createUsers[0].id"));
        assert!(stored.contains_key(".createUsers[1].id"));
        assert_ne!(response["createUsers"][0]["id"], response["createUsers"][1][0]["id"]);
    }

    #[test]
    fn test_before_network_without_placeholders() {
        let mut keys = manager();
        let released = Rc::new(RefCell::new(None));
        let released_clone = released.clone();

        let dispatch = keys.before_network(vars(json!({ "id": "1" })), move |variables| {
            *released_clone.borrow_mut() = Some(variables);
        });

        assert_eq!(dispatch, Dispatch::Ready);
        assert_eq!(*released.borrow(), Some(vars(json!({ "id": "1" }))));
    }

    #[test]
    fn test_optimistic_round_trip() {
        let mut keys = manager();
        let artifact = create_user_artifact();
        let mut response = json!({ "createUser": { "name": "bob" } });
        let mutation = keys.start(&artifact, Some(&mut response));
        let mutation = mutation.unwrap();
        let placeholder = response["createUser"]["id"].clone();

        // The optimistic record is written under its placeholder identity.
        let mut target = StorageTarget::default();
        let optimistic_id = format!("User:{}", placeholder.as_str().unwrap());
        target.storage.set(&optimistic_id, "name", json!("bob").into());

        // Two requests depend on the placeholder.
        let released = Rc::new(RefCell::new(Vec::new()));
        for extra in ["a", "b"] {
            let released = released.clone();
            let dispatch = keys.before_network(
                vars(json!({ "user": placeholder.clone(), "extra": extra, "nested": { "ids": [placeholder.clone()] } })),
                move |variables| released.borrow_mut().push(variables),
            );
            assert!(matches!(dispatch, Dispatch::Suspended { .. }));
        }
        assert!(released.borrow().is_empty());

        let server = json!({ "createUser": { "id": "42", "name": "bob" } });
        keys.after_network(mutation, &artifact, &server, &mut target).unwrap();

        let released = released.borrow();
        assert_eq!(released.len(), 2);
        for variables in released.iter() {
            assert_eq!(variables["user"], json!("42"));
            assert_eq!(variables["nested"]["ids"], json!(["42"]));
        }
        assert!(!keys.is_pending(&placeholder));

        assert_eq!(target.key_maps, vec![("User:42".to_string(), optimistic_id.clone())]);
        assert_eq!(target.storage.get("User:42", "name"), Some(StoredValue::from(json!("bob"))));
        assert_eq!(target.storage.get(&optimistic_id, "id"), Some(StoredValue::from(json!("42"))));

        keys.end(mutation);
        assert!(keys.keys_for(mutation.unwrap()).is_none());
        assert!(keys.object_ids_for(mutation.unwrap()).is_none());
    }

    #[test]
    fn test_request_waits_for_every_placeholder() {
        let mut keys = manager();
        let selection = Selection::new()
            .field(
                "a",
                FieldSelection::linked("a", "User", Selection::new().field("id", FieldSelection::scalar("id", "ID").as_optimistic_key())),
            )
            .field(
                "b",
                FieldSelection::linked("b", "User", Selection::new().field("id", FieldSelection::scalar("id", "ID").as_optimistic_key())),
            );
        let artifact =
            Artifact::new("Pair", ArtifactKind::Mutation, "Mutation", selection).with_optimistic_keys();
        let mut response = json!({ "a": {}, "b": {} });
        let mutation = keys.start(&artifact, Some(&mut response)).unwrap();
        assert_eq!(keys.keys_for(mutation.unwrap()).unwrap().len(), 2);

        let released = Rc::new(RefCell::new(0));
        let released_clone = released.clone();
        let dispatch = keys.before_network(
            vars(json!({ "a": response["a"]["id"].clone(), "b": response["b"]["id"].clone() })),
            move |_| *released_clone.borrow_mut() += 1,
        );
        assert!(matches!(dispatch, Dispatch::Suspended { ref pending } if pending.len() == 2));

        let mut target = StorageTarget::default();
        keys.after_network(mutation, &artifact, &json!({ "a": { "id": "1" } }), &mut target).unwrap();
        assert_eq!(*released.borrow(), 0);

        keys.after_network(mutation, &artifact, &json!({ "b": { "id": "2" } }), &mut target).unwrap();
        assert_eq!(*released.borrow(), 1);
    }

    #[test]
    fn test_unresolved_placeholder_keeps_request_suspended() {
        let mut keys = manager();
        let artifact = create_user_artifact();
        let mut response = json!({ "createUser": {} });
        let mutation = keys.start(&artifact, Some(&mut response)).unwrap();
        let placeholder = response["createUser"]["id"].clone();

        let released = Rc::new(RefCell::new(false));
        let released_clone = released.clone();
        keys.before_network(vars(json!({ "id": placeholder.clone() })), move |_| {
            *released_clone.borrow_mut() = true;
        });

        keys.end(mutation);
        assert!(keys.is_pending(&placeholder));
        assert!(!*released.borrow());
    }
}
