//! Key store gateway.
//!
//! The resolvers never talk to a database directly. They read persisted
//! (business key, surrogate key) pairs and the current maximum surrogate key
//! through the [`KeyStore`] trait, which is read-only from their point of view.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        DimensionKeyAssigner / FactKeyMapper          │
//! └──────────────────────────────────────────────────────┘
//!                           │  fetch_key_pairs / fetch_max_key
//!                           ▼
//! ┌──────────────────────────────────────────────────────┐
//! │                     KeyStore                         │
//! │   MemoryKeyStore (tests)   │   SqliteKeyStore        │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Writing newly assigned keys back is the caller's job. Two processes
//! resolving the same dimension concurrently both read the same maximum key
//! and will allocate overlapping ranges; callers must serialize writers or
//! rely on a uniqueness constraint in the store.

mod memory;
mod sqlite;

pub use memory::MemoryKeyStore;
pub use sqlite::SqliteKeyStore;

use thiserror::Error;

use crate::batch::RecordBatch;

/// Result type for store reads.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised by a [`KeyStore`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite query or connection failure.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A table or column name that cannot be safely used in a query.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The table is not known to the store.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// The column is not present in the stored table.
    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// A surrogate key column holds a value that is not an integer.
    #[error("non-integer key in {table}.{column}")]
    NonIntegerKey { table: String, column: String },

    /// The store cannot answer right now, or cannot evaluate the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A request for the persisted key pairs of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairQuery {
    pub table: String,
    pub bk_column: String,
    pub pk_column: String,
    /// Opaque row filter, interpreted by the store.
    pub filter: Option<String>,
}

impl KeyPairQuery {
    pub fn new(
        table: impl Into<String>,
        bk_column: impl Into<String>,
        pk_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            bk_column: bk_column.into(),
            pk_column: pk_column.into(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }
}

/// Read-only access to persisted key pairs.
pub trait KeyStore {
    /// Fetch the `(bk_column, pk_column)` rows of `query.table`, in store order.
    ///
    /// The returned batch has exactly two columns, named after the query's
    /// business key and surrogate key columns.
    fn fetch_key_pairs(&self, query: &KeyPairQuery) -> StoreResult<RecordBatch>;

    /// Largest surrogate key in `table`, or 0 when the table is empty.
    fn fetch_max_key(&self, table: &str, pk_column: &str) -> StoreResult<i64>;
}

impl<T: KeyStore + ?Sized> KeyStore for &T {
    fn fetch_key_pairs(&self, query: &KeyPairQuery) -> StoreResult<RecordBatch> {
        (**self).fetch_key_pairs(query)
    }

    fn fetch_max_key(&self, table: &str, pk_column: &str) -> StoreResult<i64> {
        (**self).fetch_max_key(table, pk_column)
    }
}
