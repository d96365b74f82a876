//! Document lifecycles around the cache.
//!
//! A query document subscribes its selection once per distinct set of
//! variables and resolves its observer from cache-pushed values. A mutation
//! document routes its optimistic response through the cache and reconciles
//! placeholder identities once the server answers.

use crate::cache::{Cache, WriteArgs};
use serde_json::Value;
use std::rc::Rc;
use tessera_core::{Artifact, CacheConfig, QueryResult, RecordStorage, Result, Variables};
use tessera_optimistic::{Dispatch, MutationId, OptimisticKeyManager};
use tessera_reactive::SubscriptionSpec;

/// Callback receiving every value a document resolves to.
pub type Observer = Rc<dyn Fn(&QueryResult)>;

/// Subscription lifecycle of one query document.
pub struct QueryPipeline {
    artifact: Rc<Artifact>,
    observer: Observer,
    last_variables: Option<Variables>,
    subscription: Option<Rc<SubscriptionSpec>>,
    disable_subscriptions: bool,
}

impl QueryPipeline {
    pub fn new<F>(artifact: Rc<Artifact>, observer: F) -> Self
    where
        F: Fn(&QueryResult) + 'static,
    {
        Self {
            artifact,
            observer: Rc::new(observer),
            last_variables: None,
            subscription: None,
            disable_subscriptions: false,
        }
    }

    /// Stops the pipeline from subscribing, builder style.
    pub fn without_subscriptions(mut self) -> Self {
        self.disable_subscriptions = true;
        self
    }

    /// Returns the active subscription.
    pub fn subscription(&self) -> Option<&Rc<SubscriptionSpec>> {
        self.subscription.as_ref()
    }

    /// Returns the variables of the active subscription.
    pub fn last_variables(&self) -> Option<&Variables> {
        self.last_variables.as_ref()
    }

    /// Merges the incoming variables over the last subscribed ones.
    pub fn start(&self, variables: &Variables) -> Variables {
        let mut merged = self.last_variables.clone().unwrap_or_default();
        merged.extend(variables.clone());
        merged
    }

    /// Resolves the observer with a result, subscribing first when the
    /// variables changed since the last subscription.
    pub fn end<S: RecordStorage>(
        &mut self,
        cache: &mut Cache<S>,
        variables: &Variables,
        result: &QueryResult,
    ) -> Result<()> {
        let changed = self.last_variables.as_ref() != Some(variables);
        if !self.disable_subscriptions && changed {
            if let Some(previous) = self.subscription.take() {
                cache.unsubscribe(&previous, &previous.variables);
            }

            let observer = self.observer.clone();
            let pushed_variables = variables.clone();
            let spec = Rc::new(
                SubscriptionSpec::new(
                    self.artifact.root_type.clone(),
                    self.artifact.selection.clone(),
                    move |value: &Value| {
                        observer(&QueryResult::from_cache(value.clone(), pushed_variables.clone()));
                    },
                )
                .with_variables(variables.clone()),
            );
            cache.subscribe(&spec, variables)?;

            tracing::debug!(artifact = %self.artifact.name, handle = spec.handle(), "query subscribed");
            self.subscription = Some(spec);
            self.last_variables = Some(variables.clone());
        }

        (self.observer)(result);
        Ok(())
    }

    /// Drops the active subscription.
    pub fn cleanup<S: RecordStorage>(&mut self, cache: &mut Cache<S>) {
        if let Some(spec) = self.subscription.take() {
            cache.unsubscribe(&spec, &spec.variables);
        }
        self.last_variables = None;
    }
}

/// Optimistic lifecycle of mutation documents sharing one cache.
pub struct MutationPipeline {
    keys: OptimisticKeyManager,
}

impl MutationPipeline {
    pub fn new(config: Rc<CacheConfig>) -> Self {
        Self {
            keys: OptimisticKeyManager::new(config),
        }
    }

    pub fn keys(&self) -> &OptimisticKeyManager {
        &self.keys
    }

    /// Allocates placeholders for the optimistic response and writes it.
    ///
    /// Returns the invocation id when placeholders were tracked.
    pub fn start<S: RecordStorage>(
        &mut self,
        cache: &mut Cache<S>,
        artifact: &Artifact,
        optimistic_response: Option<&mut Value>,
        variables: &Variables,
    ) -> Result<Option<MutationId>> {
        let Some(response) = optimistic_response else {
            return Ok(None);
        };
        let mutation = self.keys.start(artifact, Some(&mut *response))?;
        cache.write(WriteArgs {
            selection: &artifact.selection,
            data: response,
            variables,
            parent: None,
        })?;
        Ok(mutation)
    }

    /// Releases the request once its variables hold no placeholder.
    pub fn before_network<F>(&mut self, variables: Variables, release: F) -> Dispatch
    where
        F: FnOnce(Variables) + 'static,
    {
        self.keys.before_network(variables, release)
    }

    /// Reconciles placeholder identities, then writes the server response.
    ///
    /// Real identities are aliased onto the optimistic records first, so the
    /// response lands on the records observers already render.
    pub fn after_network<S: RecordStorage>(
        &mut self,
        cache: &mut Cache<S>,
        mutation: Option<MutationId>,
        artifact: &Artifact,
        data: &Value,
        variables: &Variables,
    ) -> Result<()> {
        self.keys.after_network(mutation, artifact, data, cache)?;
        cache.write(WriteArgs {
            selection: &artifact.selection,
            data,
            variables,
            parent: None,
        })
    }

    /// Clears the invocation's placeholder bookkeeping.
    pub fn end(&mut self, mutation: Option<MutationId>) {
        self.keys.end(mutation);
    }
}
