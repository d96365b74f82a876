//! Cursor-based pagination.
//!
//! Pages are requested relative to the cursors of the current page info:
//! forward with `first`/`after`, backward with `last`/`before`. Loaded pages
//! are merged into the list unless the document pages one window at a time.

use crate::document::{is_set, settle, FetchParams, PaginatedDocument, UpdateDirective};
use crate::page_info::{count_page, extract_page_info, PageInfo};
use serde_json::Value;
use std::rc::Rc;
use tessera_core::{Artifact, CachePolicy, Error, QueryResult, RefetchSpec, Result, Variables};

/// Arguments of [`CursorHandlers::load_next_page`].
#[derive(Clone, Debug, Default)]
pub struct ForwardArgs {
    pub first: Option<u64>,
    pub after: Option<String>,
    pub metadata: Option<Value>,
}

/// Arguments of [`CursorHandlers::load_previous_page`].
#[derive(Clone, Debug, Default)]
pub struct BackwardArgs {
    pub last: Option<u64>,
    pub before: Option<String>,
    pub metadata: Option<Value>,
}

/// Cursor pagination over a document.
pub struct CursorHandlers<D> {
    artifact: Rc<Artifact>,
    refetch: RefetchSpec,
    document: D,
}

impl<D: PaginatedDocument> CursorHandlers<D> {
    /// Creates handlers for a paginated artifact.
    pub fn new(artifact: Rc<Artifact>, document: D) -> Result<Self> {
        let refetch = artifact
            .refetch
            .clone()
            .ok_or_else(|| Error::missing_refetch(&artifact.name))?;
        Ok(Self {
            artifact,
            refetch,
            document,
        })
    }

    /// Returns the paginated document.
    pub fn document(&self) -> &D {
        &self.document
    }

    fn page_info(&self) -> PageInfo {
        extract_page_info(&self.document.state(), &self.refetch.path).unwrap_or_default()
    }

    fn from_cache(&self) -> QueryResult {
        QueryResult::from_cache(self.document.state(), self.document.variables())
    }

    /// Loads the page after the current end cursor.
    ///
    /// Resolves from the cache without a request when there is no next page.
    pub async fn load_next_page(&self, args: ForwardArgs) -> Result<QueryResult> {
        let page_info = self.page_info();
        if !page_info.has_next_page {
            return Ok(self.from_cache());
        }

        let mut input = Variables::new();
        input.insert("first".into(), args.first.or(self.refetch.page_size).into());
        input.insert("after".into(), args.after.or(page_info.end_cursor).into());
        input.insert("before".into(), Value::Null);
        input.insert("last".into(), Value::Null);

        self.load_page("first", "loadNextPage", input, args.metadata, UpdateDirective::Append)
            .await
    }

    /// Loads the page before the current start cursor.
    ///
    /// Resolves from the cache without a request when there is no previous page.
    pub async fn load_previous_page(&self, args: BackwardArgs) -> Result<QueryResult> {
        let page_info = self.page_info();
        if !page_info.has_previous_page {
            return Ok(self.from_cache());
        }

        let mut input = Variables::new();
        input.insert("before".into(), args.before.or(page_info.start_cursor).into());
        input.insert("last".into(), args.last.or(self.refetch.page_size).into());
        input.insert("first".into(), Value::Null);
        input.insert("after".into(), Value::Null);

        self.load_page("last", "loadPreviousPage", input, args.metadata, UpdateDirective::Prepend)
            .await
    }

    async fn load_page(
        &self,
        page_size_var: &str,
        operation: &str,
        input: Variables,
        metadata: Option<Value>,
        directive: UpdateDirective,
    ) -> Result<QueryResult> {
        let mut variables = self.document.variables();
        variables.extend(input);

        if !is_set(variables.get(page_size_var)) && self.refetch.page_size.is_none() {
            return Err(Error::missing_page_size(operation));
        }

        tracing::debug!(operation, artifact = %self.artifact.name, "loading cursor page");
        let result = if self.refetch.is_single_page() {
            let params = FetchParams {
                variables: Some(variables),
                policy: Some(self.artifact.policy),
                metadata,
            };
            self.document.fetch(params).await
        } else {
            let params = FetchParams {
                variables: Some(variables),
                policy: Some(CachePolicy::NetworkOnly),
                metadata,
            };
            self.document.fetch_update(params, &[directive]).await
        };
        settle(&self.document, result)
    }

    /// Refetches the document.
    ///
    /// Explicit variables that differ from the current ones are a new query
    /// and go to the document unchanged. Otherwise a list already grown past
    /// one page is refetched as a single window covering every loaded edge.
    pub async fn fetch(&self, params: FetchParams) -> Result<QueryResult> {
        if let Some(variables) = &params.variables {
            if *variables != self.document.variables() {
                let result = self.document.fetch(params).await;
                return settle(&self.document, result);
            }
        }

        let state = self.document.state();
        let Some(page_info) = extract_page_info(&state, &self.refetch.path) else {
            let result = self.document.fetch(params).await;
            return settle(&self.document, result);
        };

        let mut edges_path = self.refetch.path.clone();
        edges_path.push("edges".to_string());

        let mut query_variables = Variables::new();
        if let Some(page_size) = self.refetch.page_size {
            let count = match count_page(&edges_path, &state) as u64 {
                0 => page_size,
                n => n,
            };

            if count > page_size {
                let explicit_cursor = params.variables.as_ref().is_some_and(|v| {
                    (is_set(v.get("first")) && is_set(v.get("after")))
                        || (is_set(v.get("last")) && is_set(v.get("before")))
                });
                if page_info.has_previous_page && page_info.has_next_page && !explicit_cursor {
                    tracing::warn!(
                        artifact = %self.artifact.name,
                        "fetch() in the middle of a connection; pass a cursor covering the current set"
                    );
                }

                if !page_info.has_previous_page {
                    query_variables.insert("first".into(), count.into());
                    query_variables.insert("after".into(), Value::Null);
                    query_variables.insert("last".into(), Value::Null);
                    query_variables.insert("before".into(), Value::Null);
                } else if !page_info.has_next_page {
                    query_variables.insert("last".into(), count.into());
                    query_variables.insert("first".into(), Value::Null);
                    query_variables.insert("after".into(), Value::Null);
                    query_variables.insert("before".into(), Value::Null);
                }
            }
        }

        let FetchParams {
            variables,
            policy,
            metadata,
        } = params;
        if let Some(variables) = variables {
            query_variables.extend(variables);
        }

        let result = self
            .document
            .fetch(FetchParams {
                variables: Some(query_variables),
                policy,
                metadata,
            })
            .await;
        settle(&self.document, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{vars, Call, MockDocument};
    use serde_json::json;
    use tessera_core::{ArtifactKind, DataSource, PaginateMethod, RefetchMode, Selection};

    fn artifact(page_size: Option<u64>, mode: RefetchMode) -> Rc<Artifact> {
        Rc::new(
            Artifact::new("FriendsQuery", ArtifactKind::Query, "Query", Selection::new()).with_refetch(
                RefetchSpec {
                    path: vec!["user".into(), "friends".into()],
                    method: PaginateMethod::Cursor,
                    page_size,
                    start: None,
                    mode,
                },
            ),
        )
    }

    fn connection(edges: usize, has_next: bool, has_previous: bool) -> serde_json::Value {
        let edges: Vec<_> = (0..edges).map(|i| json!({ "cursor": format!("c{}", i) })).collect();
        json!({
            "user": {
                "friends": {
                    "edges": edges,
                    "pageInfo": {
                        "hasNextPage": has_next,
                        "hasPreviousPage": has_previous,
                        "startCursor": "c0",
                        "endCursor": "c1"
                    }
                }
            }
        })
    }

    fn handlers(document: &Rc<MockDocument>, page_size: Option<u64>, mode: RefetchMode) -> CursorHandlers<Rc<MockDocument>> {
        CursorHandlers::new(artifact(page_size, mode), document.clone()).unwrap()
    }

    #[test]
    fn test_requires_refetch_spec() {
        let artifact = Rc::new(Artifact::new("Plain", ArtifactKind::Query, "Query", Selection::new()));
        let document = Rc::new(MockDocument::default());
        assert!(matches!(
            CursorHandlers::new(artifact, document),
            Err(Error::MissingRefetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_next_page_appends_after_end_cursor() {
        let document = Rc::new(MockDocument::new(connection(2, true, false), json!({ "first": 2 })));
        let handlers = handlers(&document, Some(2), RefetchMode::Infinite);

        handlers.load_next_page(ForwardArgs::default()).await.unwrap();

        let Some(Call::Update(params, directives)) = document.last_call() else {
            panic!("expected a fetch_update");
        };
        assert_eq!(directives, vec![UpdateDirective::Append]);
        assert_eq!(params.policy, Some(CachePolicy::NetworkOnly));
        let variables = params.variables.unwrap();
        assert_eq!(variables["after"], json!("c1"));
        assert_eq!(variables["first"], json!(2));
        assert_eq!(variables["before"], json!(null));
        assert_eq!(variables["last"], json!(null));
    }

    #[tokio::test]
    async fn test_load_next_page_without_next_page() {
        let document = Rc::new(MockDocument::new(connection(2, false, false), json!({})));
        let handlers = handlers(&document, Some(2), RefetchMode::Infinite);

        let result = handlers.load_next_page(ForwardArgs::default()).await.unwrap();

        assert!(document.calls.borrow().is_empty());
        assert_eq!(result.source, DataSource::Cache);
        assert_eq!(result.data, connection(2, false, false));
    }

    #[tokio::test]
    async fn test_load_previous_page_prepends_before_start_cursor() {
        let document = Rc::new(MockDocument::new(connection(2, false, true), json!({})));
        let handlers = handlers(&document, Some(5), RefetchMode::Infinite);

        handlers
            .load_previous_page(BackwardArgs {
                last: Some(3),
                ..BackwardArgs::default()
            })
            .await
            .unwrap();

        let Some(Call::Update(params, directives)) = document.last_call() else {
            panic!("expected a fetch_update");
        };
        assert_eq!(directives, vec![UpdateDirective::Prepend]);
        let variables = params.variables.unwrap();
        assert_eq!(variables["before"], json!("c0"));
        assert_eq!(variables["last"], json!(3));
        assert_eq!(variables["first"], json!(null));
    }

    #[tokio::test]
    async fn test_missing_page_size() {
        let document = Rc::new(MockDocument::new(connection(2, true, false), json!({})));
        let handlers = handlers(&document, None, RefetchMode::Infinite);

        let err = handlers.load_next_page(ForwardArgs::default()).await.unwrap_err();
        assert_eq!(err, Error::missing_page_size("loadNextPage"));
        assert!(document.calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_single_page_replaces() {
        let document = Rc::new(MockDocument::new(connection(2, true, false), json!({})));
        let handlers = handlers(&document, Some(2), RefetchMode::SinglePage);

        handlers.load_next_page(ForwardArgs::default()).await.unwrap();

        let Some(Call::Fetch(params)) = document.last_call() else {
            panic!("expected a fetch");
        };
        assert_eq!(params.policy, Some(CachePolicy::CacheOrNetwork));
        assert_eq!(params.variables.unwrap()["after"], json!("c1"));
    }

    #[tokio::test]
    async fn test_cancelled_load_resolves_from_cache() {
        let document = Rc::new(MockDocument::new(connection(2, true, false), json!({})));
        document.fail_with(Error::Cancelled);
        let handlers = handlers(&document, Some(2), RefetchMode::Infinite);

        let result = handlers.load_next_page(ForwardArgs::default()).await.unwrap();
        assert_eq!(result.source, DataSource::Cache);

        document.fail_with(Error::network("offline"));
        let err = handlers.load_next_page(ForwardArgs::default()).await.unwrap_err();
        assert_eq!(err, Error::network("offline"));
    }

    #[tokio::test]
    async fn test_fetch_with_new_variables_is_not_pagination() {
        let document = Rc::new(MockDocument::new(connection(6, true, false), json!({ "filter": "a" })));
        let handlers = handlers(&document, Some(2), RefetchMode::Infinite);

        let params = FetchParams::with_variables(vars(json!({ "filter": "b" })));
        handlers.fetch(params.clone()).await.unwrap();

        assert_eq!(document.last_call(), Some(Call::Fetch(params)));
    }

    #[tokio::test]
    async fn test_fetch_collapses_loaded_pages() {
        let document = Rc::new(MockDocument::new(connection(6, true, false), json!({})));
        let handlers = handlers(&document, Some(2), RefetchMode::Infinite);

        handlers.fetch(FetchParams::default()).await.unwrap();

        let Some(Call::Fetch(params)) = document.last_call() else {
            panic!("expected a fetch");
        };
        let variables = params.variables.unwrap();
        assert_eq!(variables["first"], json!(6));
        assert_eq!(variables["after"], json!(null));
    }

    #[tokio::test]
    async fn test_fetch_collapses_backward_window() {
        let document = Rc::new(MockDocument::new(connection(4, false, true), json!({})));
        let handlers = handlers(&document, Some(2), RefetchMode::Infinite);

        handlers.fetch(FetchParams::default()).await.unwrap();

        let variables = document.last_call().unwrap().variables();
        assert_eq!(variables["last"], json!(4));
        assert_eq!(variables["first"], json!(null));
    }

    #[tokio::test]
    async fn test_fetch_mid_window_keeps_variables() {
        let document = Rc::new(MockDocument::new(connection(4, true, true), json!({})));
        let handlers = handlers(&document, Some(2), RefetchMode::Infinite);

        handlers.fetch(FetchParams::default()).await.unwrap();

        assert_eq!(document.last_call().unwrap().variables(), Variables::new());
    }

    #[tokio::test]
    async fn test_fetch_single_page_window() {
        let document = Rc::new(MockDocument::new(connection(2, true, false), json!({})));
        let handlers = handlers(&document, Some(2), RefetchMode::Infinite);

        handlers.fetch(FetchParams::default()).await.unwrap();

        assert_eq!(document.last_call().unwrap().variables(), Variables::new());
    }
}
