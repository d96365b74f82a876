//! Tessera Pagination - Page windows over paginated documents.
//!
//! Handlers wrap a [`PaginatedDocument`] and translate "load the next page"
//! into a fetch with the right window variables:
//!
//! - [`CursorHandlers`]: `first`/`after` forward, `last`/`before` backward,
//!   cursors read from the connection's `pageInfo`
//! - [`OffsetHandlers`]: `offset`/`limit` with a running offset
//!
//! Loaded pages are merged into the document with an explicit
//! [`UpdateDirective`], unless the artifact pages one window at a time.
//!
//! # Example
//!
//! ```ignore
//! let handlers = PaginationHandlers::new(artifact, document)?;
//!
//! // Appends the page after pageInfo.endCursor
//! handlers.load_next_page(PageArgs::default()).await?;
//! ```

mod cursor;
mod document;
mod offset;
mod page_info;

#[cfg(test)]
mod testing;

pub use cursor::{BackwardArgs, CursorHandlers, ForwardArgs};
pub use document::{FetchParams, PaginatedDocument, UpdateDirective};
pub use offset::{OffsetArgs, OffsetHandlers};
pub use page_info::{count_page, extract_page_info, PageInfo};

use serde_json::Value;
use std::rc::Rc;
use tessera_core::{Artifact, Error, PaginateMethod, QueryResult, Result};

/// Window arguments shared by both pagination methods.
///
/// `count` is `first` for cursors and `limit` for offsets; `cursor` is
/// ignored by offset pagination.
#[derive(Clone, Debug, Default)]
pub struct PageArgs {
    pub count: Option<u64>,
    pub cursor: Option<String>,
    pub offset: Option<u64>,
    pub metadata: Option<Value>,
}

/// The pagination handlers of a paginated artifact.
pub enum PaginationHandlers<D> {
    Cursor(CursorHandlers<D>),
    Offset(OffsetHandlers<D>),
}

impl<D: PaginatedDocument> PaginationHandlers<D> {
    /// Picks the handlers matching the artifact's pagination method.
    pub fn new(artifact: Rc<Artifact>, document: D) -> Result<Self> {
        let method = artifact
            .refetch
            .as_ref()
            .map(|refetch| refetch.method)
            .ok_or_else(|| Error::missing_refetch(&artifact.name))?;
        match method {
            PaginateMethod::Cursor => Ok(Self::Cursor(CursorHandlers::new(artifact, document)?)),
            PaginateMethod::Offset => Ok(Self::Offset(OffsetHandlers::new(artifact, document)?)),
        }
    }

    pub async fn load_next_page(&self, args: PageArgs) -> Result<QueryResult> {
        match self {
            Self::Cursor(handlers) => {
                handlers
                    .load_next_page(ForwardArgs {
                        first: args.count,
                        after: args.cursor,
                        metadata: args.metadata,
                    })
                    .await
            }
            Self::Offset(handlers) => {
                handlers
                    .load_next_page(OffsetArgs {
                        limit: args.count,
                        offset: args.offset,
                        metadata: args.metadata,
                    })
                    .await
            }
        }
    }

    /// Loads the previous page. Only cursor pagination walks backward.
    pub async fn load_previous_page(&self, args: PageArgs) -> Result<QueryResult> {
        match self {
            Self::Cursor(handlers) => {
                handlers
                    .load_previous_page(BackwardArgs {
                        last: args.count,
                        before: args.cursor,
                        metadata: args.metadata,
                    })
                    .await
            }
            Self::Offset(_) => Err(Error::invalid_operation(
                "loadPreviousPage is not supported by offset pagination",
            )),
        }
    }

    pub async fn fetch(&self, params: FetchParams) -> Result<QueryResult> {
        match self {
            Self::Cursor(handlers) => handlers.fetch(params).await,
            Self::Offset(handlers) => handlers.fetch(params).await,
        }
    }

    /// Returns the paginated document.
    pub fn document(&self) -> &D {
        match self {
            Self::Cursor(handlers) => handlers.document(),
            Self::Offset(handlers) => handlers.document(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockDocument};
    use serde_json::json;
    use tessera_core::{ArtifactKind, RefetchMode, RefetchSpec, Selection};

    fn artifact(method: PaginateMethod) -> Rc<Artifact> {
        Rc::new(
            Artifact::new("Feed", ArtifactKind::Query, "Query", Selection::new()).with_refetch(RefetchSpec {
                path: vec!["feed".into()],
                method,
                page_size: Some(2),
                start: None,
                mode: RefetchMode::Infinite,
            }),
        )
    }

    #[tokio::test]
    async fn test_dispatch_by_method() {
        let document = Rc::new(MockDocument::new(json!({ "feed": [1, 2] }), json!({})));

        let offset = PaginationHandlers::new(artifact(PaginateMethod::Offset), document.clone()).unwrap();
        assert!(matches!(offset, PaginationHandlers::Offset(_)));
        offset.load_next_page(PageArgs::default()).await.unwrap();
        assert_eq!(document.last_call().unwrap().variables()["offset"], json!(2));

        let err = offset.load_previous_page(PageArgs::default()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));

        let cursor = PaginationHandlers::new(artifact(PaginateMethod::Cursor), document.clone()).unwrap();
        assert!(matches!(cursor, PaginationHandlers::Cursor(_)));
        let calls = document.calls.borrow().len();
        cursor.load_next_page(PageArgs::default()).await.unwrap();
        assert_eq!(document.calls.borrow().len(), calls);
        assert!(matches!(document.last_call(), Some(Call::Update(..))));
    }
}
