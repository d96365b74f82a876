//! Document artifacts.
//!
//! An artifact is the immutable, generated description of one document: its
//! kind, root type, selection and optional pagination settings.

use crate::result::CachePolicy;
use crate::selection::Selection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;

/// The kind of document an artifact describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    Query,
    Mutation,
    Fragment,
    Subscription,
}

/// How a paginated field is walked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaginateMethod {
    Cursor,
    Offset,
}

/// Whether loaded pages accumulate or replace each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefetchMode {
    #[default]
    Infinite,
    SinglePage,
}

/// Pagination settings of a paginated document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefetchSpec {
    /// Response path from the document root to the paginated field.
    #[serde(default)]
    pub path: Vec<String>,
    pub method: PaginateMethod,
    /// Default page size.
    #[serde(default)]
    pub page_size: Option<u64>,
    /// Initial cursor or offset.
    #[serde(default)]
    pub start: Option<Value>,
    #[serde(default)]
    pub mode: RefetchMode,
}

impl RefetchSpec {
    /// Returns true for single-page pagination.
    #[inline]
    pub fn is_single_page(&self) -> bool {
        self.mode == RefetchMode::SinglePage
    }
}

/// A generated document artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub root_type: String,
    pub selection: Rc<Selection>,
    /// Whether any field in the selection carries an optimistic key.
    #[serde(default)]
    pub optimistic_keys: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refetch: Option<RefetchSpec>,
    #[serde(default)]
    pub policy: CachePolicy,
}

impl Artifact {
    /// Creates an artifact with the given kind and selection.
    pub fn new(
        name: impl Into<String>,
        kind: ArtifactKind,
        root_type: impl Into<String>,
        selection: Selection,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            root_type: root_type.into(),
            selection: Rc::new(selection),
            optimistic_keys: false,
            refetch: None,
            policy: CachePolicy::default(),
        }
    }

    /// Sets the pagination settings, builder style.
    pub fn with_refetch(mut self, refetch: RefetchSpec) -> Self {
        self.refetch = Some(refetch);
        self
    }

    /// Flags the artifact as carrying optimistic keys, builder style.
    pub fn with_optimistic_keys(mut self) -> Self {
        self.optimistic_keys = true;
        self
    }

    /// Returns true for mutation documents.
    #[inline]
    pub fn is_mutation(&self) -> bool {
        self.kind == ArtifactKind::Mutation
    }
}
