//! In-process key store.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use super::{KeyPairQuery, KeyStore, StoreError, StoreResult};
use crate::batch::{RecordBatch, Value};

/// A key store backed by in-memory batches, one per table.
///
/// Counts reads per table so callers can verify how often a resolver went to
/// the store. Filters support a single `column = literal` equality.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    tables: HashMap<String, RecordBatch>,
    failing: HashSet<String>,
    fetches: RefCell<HashMap<String, usize>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a table.
    pub fn insert_table(&mut self, table: impl Into<String>, batch: RecordBatch) {
        self.tables.insert(table.into(), batch);
    }

    /// Builder form of [`insert_table`](Self::insert_table).
    pub fn with_table(mut self, table: impl Into<String>, batch: RecordBatch) -> Self {
        self.insert_table(table, batch);
        self
    }

    /// Register a two-column table from `(bk, pk)` pairs.
    pub fn with_pairs<I, B, P>(self, table: &str, bk_column: &str, pk_column: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (B, P)>,
        B: Into<Value>,
        P: Into<Value>,
    {
        let rows = pairs
            .into_iter()
            .map(|(bk, pk)| vec![bk.into(), pk.into()])
            .collect();
        let batch = RecordBatch::from_parts(vec![bk_column.to_string(), pk_column.to_string()], rows);
        self.with_table(table, batch)
    }

    /// Make every read against `table` fail.
    pub fn fail_table(&mut self, table: impl Into<String>) {
        self.failing.insert(table.into());
    }

    /// Number of reads (pairs or max key) issued against `table`.
    pub fn fetch_count(&self, table: &str) -> usize {
        self.fetches.borrow().get(table).copied().unwrap_or(0)
    }

    /// Total number of reads across all tables.
    pub fn total_fetches(&self) -> usize {
        self.fetches.borrow().values().sum()
    }

    fn table(&self, table: &str) -> StoreResult<&RecordBatch> {
        *self.fetches.borrow_mut().entry(table.to_string()).or_insert(0) += 1;

        if self.failing.contains(table) {
            return Err(StoreError::Unavailable(format!(
                "reads against '{}' are configured to fail",
                table
            )));
        }
        self.tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }
}

fn column_index(batch: &RecordBatch, table: &str, column: &str) -> StoreResult<usize> {
    batch
        .column_index(column)
        .ok_or_else(|| StoreError::ColumnNotFound {
            table: table.to_string(),
            column: column.to_string(),
        })
}

/// Parse `column = 'text'` or `column = 42`.
fn parse_filter(filter: &str) -> StoreResult<(String, Value)> {
    let unsupported = || StoreError::Unavailable(format!("unsupported filter: {}", filter));

    let (column, literal) = filter.split_once('=').ok_or_else(unsupported)?;
    let column = column.trim();
    let literal = literal.trim();
    if column.is_empty() || literal.is_empty() {
        return Err(unsupported());
    }

    let value = if let Some(text) = literal
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        Value::String(text.to_string())
    } else if let Ok(n) = literal.parse::<i64>() {
        Value::Int(n)
    } else {
        return Err(unsupported());
    };

    Ok((column.to_string(), value))
}

impl KeyStore for MemoryKeyStore {
    fn fetch_key_pairs(&self, query: &KeyPairQuery) -> StoreResult<RecordBatch> {
        let batch = self.table(&query.table)?;
        let bk = column_index(batch, &query.table, &query.bk_column)?;
        let pk = column_index(batch, &query.table, &query.pk_column)?;

        let filter = match &query.filter {
            Some(f) => {
                let (column, value) = parse_filter(f)?;
                Some((column_index(batch, &query.table, &column)?, value))
            }
            None => None,
        };

        let rows = batch
            .rows()
            .iter()
            .filter(|row| match &filter {
                Some((index, value)) => row[*index].as_key_text() == value.as_key_text(),
                None => true,
            })
            .map(|row| vec![row[bk].clone(), row[pk].clone()])
            .collect();

        Ok(RecordBatch::from_parts(
            vec![query.bk_column.clone(), query.pk_column.clone()],
            rows,
        ))
    }

    fn fetch_max_key(&self, table: &str, pk_column: &str) -> StoreResult<i64> {
        let batch = self.table(table)?;
        let pk = column_index(batch, table, pk_column)?;

        let mut max = 0;
        for row in batch.rows() {
            let value = &row[pk];
            if value.is_null() {
                continue;
            }
            let key = value.as_int().ok_or_else(|| StoreError::NonIntegerKey {
                table: table.to_string(),
                column: pk_column.to_string(),
            })?;
            max = max.max(key);
        }
        Ok(max)
    }
}
