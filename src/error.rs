//! Error taxonomy for key resolution.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for key resolution operations.
pub type KeyResult<T> = Result<T, KeyError>;

/// Errors raised by the key resolution engine.
///
/// Every variant is raised at the point of detection and carries a message
/// with the table, columns, affected row count and a bounded sample of the
/// offending values. Nothing is retried internally.
#[derive(Error, Debug)]
pub enum KeyError {
    /// Caller misuse: no business key columns, no dimensions registered.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required column is absent from a batch.
    #[error("schema error: {0}")]
    Schema(String),

    /// Data-quality violation in the incoming batch.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invariant violation discovered while resolving.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// The key store failed to answer a read.
    #[error("store access failed for table '{table}' (columns: {columns}): {source}")]
    StoreAccess {
        /// Table the read was issued against.
        table: String,
        /// Columns that were requested.
        columns: String,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
}

/// Discriminant of [`KeyError`], handy for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Schema,
    Validation,
    Consistency,
    StoreAccess,
}

impl KeyError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency(message.into())
    }

    /// Wrap a store failure with the table and columns that were attempted.
    pub fn store_access(table: impl Into<String>, columns: &[&str], source: StoreError) -> Self {
        Self::StoreAccess {
            table: table.into(),
            columns: columns.join(", "),
            source,
        }
    }

    /// Error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Schema(_) => ErrorKind::Schema,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Consistency(_) => ErrorKind::Consistency,
            Self::StoreAccess { .. } => ErrorKind::StoreAccess,
        }
    }

    /// Check if this error originates from the key store rather than the data.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreAccess { .. })
    }
}
