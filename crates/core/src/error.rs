//! Error types for Tessera cache operations.

use thiserror::Error;

/// Result type alias for Tessera operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced by the cache core.
///
/// Configuration errors (`MissingPageSize`, `UnsupportedOptimisticKey`,
/// `MissingRefetch`, `Config`) are fatal to the operation that raised them.
/// `Cancelled` is not a failure: pagination loaders turn it into a
/// cache-sourced result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A non-root record was traversed before its `__typename` was written.
    #[error("record {record} has no __typename in storage")]
    MissingTypename { record: String },

    /// Neither the call arguments nor the artifact provide a page size.
    #[error("{operation} is missing the required page arguments")]
    MissingPageSize { operation: String },

    /// No placeholder can be synthesized for this scalar type.
    #[error(
        "unsupported type for optimistic key: {type_name}. Please provide a value in your mutation arguments."
    )]
    UnsupportedOptimisticKey { type_name: String },

    /// Pagination was requested on an artifact without refetch configuration.
    #[error("artifact {artifact} is not paginated")]
    MissingRefetch { artifact: String },

    /// Invalid cache configuration.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// Transport failure reported by the fetch layer.
    #[error("network error: {message}")]
    Network { message: String },

    /// The in-flight request was aborted.
    #[error("request cancelled")]
    Cancelled,

    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl Error {
    /// Creates a missing typename error.
    pub fn missing_typename(record: impl Into<String>) -> Self {
        Error::MissingTypename {
            record: record.into(),
        }
    }

    /// Creates a missing page size error naming the offending operation.
    pub fn missing_page_size(operation: impl Into<String>) -> Self {
        Error::MissingPageSize {
            operation: operation.into(),
        }
    }

    /// Creates an unsupported optimistic key error.
    pub fn unsupported_optimistic_key(type_name: impl Into<String>) -> Self {
        Error::UnsupportedOptimisticKey {
            type_name: type_name.into(),
        }
    }

    /// Creates a missing refetch error.
    pub fn missing_refetch(artifact: impl Into<String>) -> Self {
        Error::MissingRefetch {
            artifact: artifact.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Error::Network {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this error represents an aborted request.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
