//! The document contract pagination handlers drive.

use serde_json::Value;
use std::rc::Rc;
use tessera_core::{CachePolicy, QueryResult, Result, Variables};

/// How a fetched page merges into the current list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateDirective {
    Prepend,
    Append,
}

/// Parameters of one fetch.
///
/// `variables` are overrides: the document merges them over its current
/// variables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchParams {
    pub variables: Option<Variables>,
    pub policy: Option<CachePolicy>,
    pub metadata: Option<Value>,
}

impl FetchParams {
    /// Creates parameters overriding the given variables.
    pub fn with_variables(variables: Variables) -> Self {
        Self {
            variables: Some(variables),
            ..Self::default()
        }
    }
}

/// A paginated document.
///
/// `fetch` replaces the document's value. `fetch_update` merges the fetched
/// page into it according to the directives.
#[allow(async_fn_in_trait)]
pub trait PaginatedDocument {
    /// Returns the current value of the document.
    fn state(&self) -> Value;

    /// Returns the variables of the current value.
    fn variables(&self) -> Variables;

    async fn fetch(&self, params: FetchParams) -> Result<QueryResult>;

    async fn fetch_update(
        &self,
        params: FetchParams,
        directives: &[UpdateDirective],
    ) -> Result<QueryResult>;
}

impl<T: PaginatedDocument> PaginatedDocument for Rc<T> {
    fn state(&self) -> Value {
        (**self).state()
    }

    fn variables(&self) -> Variables {
        (**self).variables()
    }

    async fn fetch(&self, params: FetchParams) -> Result<QueryResult> {
        (**self).fetch(params).await
    }

    async fn fetch_update(
        &self,
        params: FetchParams,
        directives: &[UpdateDirective],
    ) -> Result<QueryResult> {
        (**self).fetch_update(params, directives).await
    }
}

/// Resolves a cancelled fetch to the document's current value.
pub(crate) fn settle<D: PaginatedDocument>(document: &D, result: Result<QueryResult>) -> Result<QueryResult> {
    match result {
        Err(err) if err.is_cancelled() => {
            tracing::debug!("pagination fetch cancelled");
            Ok(QueryResult::from_cache(document.state(), document.variables()))
        }
        other => other,
    }
}

/// Returns true if the variable carries a usable value.
pub(crate) fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
