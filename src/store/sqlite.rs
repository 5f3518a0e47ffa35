//! SQLite-backed key store.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::debug;

use super::{KeyPairQuery, KeyStore, StoreError, StoreResult};
use crate::batch::{RecordBatch, Value};

/// Reads key pairs from tables in a SQLite database.
///
/// The store only issues `SELECT`s. [`connection`](Self::connection) exposes
/// the underlying handle so callers can write resolved rows back themselves.
pub struct SqliteKeyStore {
    conn: Connection,
}

impl SqliteKeyStore {
    /// Open a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Quote a table or column name, rejecting anything outside `[A-Za-z0-9_.]`.
///
/// Dotted names are quoted per part (`main.dim_x` -> `"main"."dim_x"`).
fn quote_identifier(name: &str) -> StoreResult<String> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if !valid {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }

    let parts: Vec<String> = name.split('.').map(|p| format!("\"{}\"", p)).collect();
    Ok(parts.join("."))
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl KeyStore for SqliteKeyStore {
    fn fetch_key_pairs(&self, query: &KeyPairQuery) -> StoreResult<RecordBatch> {
        let mut sql = format!(
            "SELECT {}, {} FROM {}",
            quote_identifier(&query.bk_column)?,
            quote_identifier(&query.pk_column)?,
            quote_identifier(&query.table)?
        );
        if let Some(filter) = &query.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        debug!(%sql, "fetching key pairs");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(vec![to_value(row.get_ref(0)?), to_value(row.get_ref(1)?)])
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RecordBatch::from_parts(
            vec![query.bk_column.clone(), query.pk_column.clone()],
            rows,
        ))
    }

    fn fetch_max_key(&self, table: &str, pk_column: &str) -> StoreResult<i64> {
        // MAX() compares TEXT keys lexically, so the fold happens here.
        let pk = quote_identifier(pk_column)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} IS NOT NULL",
            pk,
            quote_identifier(table)?,
            pk
        );
        debug!(%sql, "fetching max key");

        let mut stmt = self.conn.prepare(&sql)?;
        let keys = stmt
            .query_map([], |row| Ok(to_value(row.get_ref(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut max = 0;
        for key in &keys {
            let key = key.as_int().ok_or_else(|| StoreError::NonIntegerKey {
                table: table.to_string(),
                column: pk_column.to_string(),
            })?;
            max = max.max(key);
        }
        Ok(max)
    }
}
