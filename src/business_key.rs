//! Business key construction.
//!
//! A business key is the `||`-joined string form of one or more source
//! columns, with null rendered as the empty string. The join is positional:
//! `["a", "b"]` and `["b", "a"]` produce different keys.

use crate::batch::{RecordBatch, Value};
use crate::config::KeyConfig;
use crate::error::{KeyError, KeyResult};

/// Derives a single string key column from ordered source columns.
#[derive(Debug, Clone)]
pub struct BusinessKeyBuilder {
    columns: Vec<String>,
    separator: String,
}

impl BusinessKeyBuilder {
    /// Builder over `columns`, using the default separator.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            separator: KeyConfig::default().separator,
        }
    }

    /// Builder using the separator from `config`.
    pub fn with_config<I, S>(columns: I, config: &KeyConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(columns).separator(config.separator.clone())
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Compute the key for every row of `batch`, returned as a standalone column.
    pub fn build(&self, batch: &RecordBatch) -> KeyResult<Vec<Value>> {
        if self.columns.is_empty() {
            return Err(KeyError::configuration(
                "must provide at least one column for the business key",
            ));
        }

        let missing: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| !batch.has_column(c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(KeyError::schema(format!(
                "business key source columns missing from batch: [{}] (available: {})",
                missing.join(", "),
                batch.columns().join(", ")
            )));
        }

        let indices: Vec<usize> = self
            .columns
            .iter()
            .filter_map(|c| batch.column_index(c))
            .collect();

        Ok(batch
            .rows()
            .iter()
            .map(|row| {
                let parts: Vec<String> = indices.iter().map(|&i| row[i].to_string()).collect();
                Value::String(parts.join(&self.separator))
            })
            .collect())
    }

    /// Compute the key and attach it to `batch` as column `name`.
    pub fn attach(&self, batch: &mut RecordBatch, name: &str) -> KeyResult<()> {
        let values = self.build(batch)?;
        batch.add_column(name, values)
    }

    /// Attach the key under the name derived for `table` (`bk_<table>`).
    ///
    /// Returns the column name used.
    pub fn attach_for_table(
        &self,
        batch: &mut RecordBatch,
        table: &str,
        config: &KeyConfig,
    ) -> KeyResult<String> {
        let name = config.bk_column_for(table);
        self.attach(batch, &name)?;
        Ok(name)
    }
}

/// Build and attach the business key for `table` from `columns`, returning the
/// key column's values.
///
/// The table may be the batch's own table or a related one, e.g. attaching
/// `bk_customer` to a sales fact batch before mapping it.
pub fn add_bk_for_table<S: AsRef<str>>(
    table: &str,
    batch: &mut RecordBatch,
    columns: &[S],
    config: &KeyConfig,
) -> KeyResult<Vec<Value>> {
    let builder = BusinessKeyBuilder::with_config(columns.iter().map(|c| c.as_ref()), config);
    let values = builder.build(batch)?;
    batch.add_column(config.bk_column_for(table), values.clone())?;
    Ok(values)
}
