//! # starkeys
//!
//! Surrogate key resolution for star-schema warehouses.
//!
//! ## Architecture
//!
//! Business identifiers in source data are turned into stable integer
//! surrogate keys for dimensions, and those keys are propagated into facts:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 RecordBatch (raw records)                │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [BusinessKeyBuilder]
//! ┌─────────────────────────────────────────────────────────┐
//! │              bk_<table> = col_a||col_b||...              │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [KeyResolver + KeyStore]
//! ┌─────────────────────────────────────────────────────────┐
//! │        validate -> fetch pairs -> left join -> check     │
//! └─────────────────────────────────────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │  DimensionKeyAssigner    │   │      FactKeyMapper       │
//! │  allocate max+1..max+n   │   │  per dimension, sentinel │
//! └──────────────────────────┘   └──────────────────────────┘
//! ```
//!
//! The engine only reads from the key store. Persisting the resolved batch is
//! left to the caller, who must also serialize concurrent writers of the same
//! dimension: each resolution snapshots the current maximum key once.

pub mod batch;
pub mod business_key;
pub mod config;
pub mod error;
pub mod resolver;
pub mod store;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::batch::{RecordBatch, Value};
    pub use crate::business_key::{add_bk_for_table, BusinessKeyBuilder};
    pub use crate::config::{KeyConfig, Settings};
    pub use crate::error::{ErrorKind, KeyError, KeyResult};
    pub use crate::resolver::{
        DimensionKeyAssigner, DimensionMapping, DimensionOptions, FactKeyMapper, KeyResolver,
        MissingKeyPolicy, ResolutionState,
    };
    pub use crate::store::{KeyPairQuery, KeyStore, MemoryKeyStore, SqliteKeyStore, StoreError};
}

// Also export at crate root for convenience
pub use batch::{RecordBatch, Value};
pub use business_key::BusinessKeyBuilder;
pub use config::KeyConfig;
pub use error::{ErrorKind, KeyError, KeyResult};
pub use resolver::{DimensionKeyAssigner, FactKeyMapper, KeyResolver};
pub use store::{KeyStore, MemoryKeyStore, SqliteKeyStore};
