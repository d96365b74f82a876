//! Offset-based pagination.

use crate::document::{is_set, settle, FetchParams, PaginatedDocument, UpdateDirective};
use crate::page_info::count_page;
use core::cell::Cell;
use serde_json::Value;
use std::rc::Rc;
use tessera_core::{Artifact, CachePolicy, Error, QueryResult, RefetchSpec, Result};

/// Arguments of [`OffsetHandlers::load_next_page`].
#[derive(Clone, Debug, Default)]
pub struct OffsetArgs {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub metadata: Option<Value>,
}

/// Offset pagination over a document.
///
/// The running offset starts at the configured start, the number of loaded
/// items or the page size, whichever is known first. It only advances when a
/// page load succeeds.
pub struct OffsetHandlers<D> {
    artifact: Rc<Artifact>,
    refetch: RefetchSpec,
    document: D,
    current_offset: Cell<u64>,
}

impl<D: PaginatedDocument> OffsetHandlers<D> {
    /// Creates handlers for a paginated artifact.
    pub fn new(artifact: Rc<Artifact>, document: D) -> Result<Self> {
        let refetch = artifact
            .refetch
            .clone()
            .ok_or_else(|| Error::missing_refetch(&artifact.name))?;
        let handlers = Self {
            artifact,
            refetch,
            document,
            current_offset: Cell::new(0),
        };
        handlers.current_offset.set(handlers.initial_offset());
        Ok(handlers)
    }

    /// Returns the paginated document.
    pub fn document(&self) -> &D {
        &self.document
    }

    /// Returns the offset the next page starts at.
    pub fn current_offset(&self) -> u64 {
        self.current_offset.get()
    }

    fn initial_offset(&self) -> u64 {
        let loaded = count_page(&self.refetch.path, &self.document.state()) as u64;
        let mut offset = self
            .refetch
            .start
            .as_ref()
            .and_then(Value::as_u64)
            .filter(|start| *start > 0)
            .or((loaded > 0).then_some(loaded))
            .or(self.refetch.page_size)
            .unwrap_or(0);

        if self.refetch.is_single_page() {
            offset += self
                .document
                .variables()
                .get("offset")
                .and_then(Value::as_u64)
                .unwrap_or(0);
        }
        offset
    }

    /// Loads the page starting at the running offset.
    pub async fn load_next_page(&self, args: OffsetArgs) -> Result<QueryResult> {
        let offset = args.offset.unwrap_or_else(|| self.current_offset.get());

        let mut variables = self.document.variables();
        variables.insert("offset".into(), offset.into());
        if let Some(limit) = args.limit {
            variables.insert("limit".into(), limit.into());
        }

        if !is_set(variables.get("limit")) && self.refetch.page_size.is_none() {
            return Err(Error::missing_page_size("loadNextPage"));
        }
        let page_size = variables
            .get("limit")
            .and_then(Value::as_u64)
            .filter(|limit| *limit > 0)
            .or(self.refetch.page_size)
            .unwrap_or(0);

        tracing::debug!(offset, page_size, artifact = %self.artifact.name, "loading offset page");
        let result = if self.refetch.is_single_page() {
            let params = FetchParams {
                variables: Some(variables),
                policy: Some(self.artifact.policy),
                metadata: args.metadata,
            };
            self.document.fetch(params).await
        } else {
            let params = FetchParams {
                variables: Some(variables),
                policy: Some(CachePolicy::NetworkOnly),
                metadata: args.metadata,
            };
            self.document.fetch_update(params, &[UpdateDirective::Append]).await
        };

        if result.is_ok() {
            self.current_offset.set(offset + page_size);
        }
        settle(&self.document, result)
    }

    /// Refetches the document.
    ///
    /// With unchanged variables, a window grown past one page is replayed as
    /// a single request covering every loaded item.
    pub async fn fetch(&self, params: FetchParams) -> Result<QueryResult> {
        if let Some(variables) = &params.variables {
            if *variables != self.document.variables() {
                let result = self.document.fetch(params).await;
                return settle(&self.document, result);
            }
        }

        let count = match self.current_offset.get() {
            0 => self.initial_offset(),
            n => n,
        };

        let mut query_variables = tessera_core::Variables::new();
        if self.refetch.page_size.map_or(true, |page_size| count > page_size) {
            query_variables.insert("limit".into(), count.into());
        }

        let result = self
            .document
            .fetch(FetchParams {
                variables: Some(query_variables),
                ..params
            })
            .await;
        settle(&self.document, result)
    }
}
