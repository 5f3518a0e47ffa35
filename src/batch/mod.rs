//! Record batches: ordered, column-named tables of scalar values.
//!
//! A [`RecordBatch`] is the unit every resolver consumes and produces. The
//! caller keeps ownership of its input; resolvers work on their own copy and
//! hand back a new batch.
//!
//! # Serialized Shape
//!
//! ```text
//! {
//!   "columns": ["bk_customer", "name"],
//!   "rows": [["alice", "Alice A."], ["bob", null]]
//! }
//! ```

mod value;

pub use value::Value;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KeyError, KeyResult};

/// An ordered collection of rows sharing one list of named columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawBatch")]
pub struct RecordBatch {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Unvalidated wire form of a batch.
#[derive(Deserialize)]
struct RawBatch {
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

impl TryFrom<RawBatch> for RecordBatch {
    type Error = KeyError;

    fn try_from(raw: RawBatch) -> Result<Self, Self::Error> {
        RecordBatch::from_rows(raw.columns, raw.rows)
    }
}

impl RecordBatch {
    /// Create an empty batch with the given columns.
    pub fn new<I, S>(columns: I) -> KeyResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_rows(columns, Vec::new())
    }

    /// Create a batch from columns and rows.
    ///
    /// Fails with a schema error on duplicate column names or on rows whose
    /// width differs from the column count.
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> KeyResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();

        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(KeyError::schema(format!(
                    "duplicate column '{}' in batch",
                    column
                )));
            }
        }

        let batch = Self {
            columns,
            rows: Vec::with_capacity(rows.len()),
        };
        rows.into_iter().try_fold(batch, |mut batch, row| {
            batch.push_row(row)?;
            Ok(batch)
        })
    }

    /// Append a row. Its width must match the column count.
    pub fn push_row(&mut self, row: Vec<Value>) -> KeyResult<()> {
        if row.len() != self.columns.len() {
            return Err(KeyError::schema(format!(
                "row {} has {} values but the batch has {} columns ({})",
                self.rows.len(),
                row.len(),
                self.columns.len(),
                self.columns.join(", ")
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Look up a column position, failing with a schema error naming `owner`.
    pub fn require_column(&self, name: &str, owner: &str) -> KeyResult<usize> {
        self.column_index(name).ok_or_else(|| {
            KeyError::schema(format!(
                "column '{}' not found in batch for '{}' (available: {})",
                name,
                owner,
                self.columns.join(", ")
            ))
        })
    }

    /// Values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[index])
    }

    /// Overwrite a single cell. Returns false if the row or column is absent.
    pub fn set_value(&mut self, row: usize, column: &str, value: Value) -> bool {
        let Some(index) = self.column_index(column) else {
            return false;
        };
        match self.rows.get_mut(row) {
            Some(r) => {
                r[index] = value;
                true
            }
            None => false,
        }
    }

    /// Attach a column, replacing an existing column of the same name.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> KeyResult<()> {
        let name = name.into();
        if values.len() != self.rows.len() {
            return Err(KeyError::schema(format!(
                "column '{}' has {} values but the batch has {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }

        match self.column_index(&name) {
            Some(index) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[index] = value;
                }
            }
            None => {
                self.columns.push(name);
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Remove columns by name. Names not present are ignored.
    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) {
        let mut keep: Vec<bool> = vec![true; self.columns.len()];
        for name in names {
            if let Some(index) = self.column_index(name.as_ref()) {
                keep[index] = false;
            }
        }
        if keep.iter().all(|k| *k) {
            return;
        }

        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| *flags.next().unwrap_or(&true));
        }
    }

    /// New batch holding the rows for which `predicate` returns true.
    pub fn filter_rows<F>(&self, mut predicate: F) -> RecordBatch
    where
        F: FnMut(&[Value]) -> bool,
    {
        RecordBatch {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| predicate(row))
                .cloned()
                .collect(),
        }
    }

    /// First `n` rows, for bounded diagnostics.
    pub fn head(&self, n: usize) -> RecordBatch {
        RecordBatch {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<Value>] {
        &mut self.rows
    }

    /// Build a batch whose rows are already known to match `columns`.
    pub(crate) fn from_parts(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, rows }
    }
}

impl fmt::Display for RecordBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join(" | "))?;
        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|v| match v {
                    Value::Null => "null".to_string(),
                    other => other.to_string(),
                })
                .collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}
