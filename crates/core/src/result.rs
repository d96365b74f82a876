//! Results pushed to document observers.

use crate::value::Variables;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a result came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataSource {
    Cache,
    Network,
    Optimistic,
}

/// How a document resolves between cache and network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachePolicy {
    #[default]
    CacheOrNetwork,
    CacheOnly,
    CacheAndNetwork,
    NetworkOnly,
    NoCache,
}

/// The value a document holds after a fetch or a cache update.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    pub data: Value,
    pub errors: Option<Vec<Value>>,
    pub fetching: bool,
    pub partial: bool,
    pub stale: bool,
    pub source: DataSource,
    pub variables: Variables,
}

impl QueryResult {
    /// Creates a settled result sourced from the cache.
    pub fn from_cache(data: Value, variables: Variables) -> Self {
        Self {
            data,
            errors: None,
            fetching: false,
            partial: false,
            stale: false,
            source: DataSource::Cache,
            variables,
        }
    }

    /// Creates a settled result sourced from the network.
    pub fn from_network(data: Value, variables: Variables) -> Self {
        Self {
            source: DataSource::Network,
            ..Self::from_cache(data, variables)
        }
    }

    /// Marks the result as partial, builder style.
    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }
}
