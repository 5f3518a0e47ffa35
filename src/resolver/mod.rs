//! Key resolution engine.
//!
//! [`KeyResolver`] is the shared capability: it validates an incoming batch's
//! business key column, fetches persisted key pairs, left-joins them onto the
//! batch and checks that the result is still one row per input row with an
//! injective BK -> PK mapping.
//!
//! Two orchestrators compose it:
//!
//! - [`DimensionKeyAssigner`] resolves a dimension batch and allocates new
//!   surrogate keys for business keys the store has never seen.
//! - [`FactKeyMapper`] resolves the dimension references of a fact batch,
//!   one registered dimension at a time, and never allocates keys.
//!
//! Both move from [`ResolutionState::Unprocessed`] to
//! [`ResolutionState::Processed`] exactly once. Later calls return the cached
//! batch without touching the store. A failed call leaves the instance
//! unprocessed with its working batch untouched.

mod dimension;
mod fact;

pub use dimension::{DimensionKeyAssigner, DimensionOptions};
pub use fact::{DimensionMapping, FactKeyMapper, MissingKeyPolicy};

use std::collections::HashMap;

use tracing::debug;

use crate::batch::{RecordBatch, Value};
use crate::config::KeyConfig;
use crate::error::{KeyError, KeyResult};
use crate::store::{KeyPairQuery, KeyStore};

/// Lifecycle of a resolver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionState {
    #[default]
    Unprocessed,
    Processed,
}

impl ResolutionState {
    pub fn is_processed(self) -> bool {
        self == ResolutionState::Processed
    }
}

/// Validation, fetch and merge of business keys against one table's key pairs.
#[derive(Debug, Clone)]
pub struct KeyResolver {
    table: String,
    bk_column: String,
    pk_column: String,
    config: KeyConfig,
}

impl KeyResolver {
    pub fn new(
        table: impl Into<String>,
        bk_column: impl Into<String>,
        pk_column: impl Into<String>,
        config: KeyConfig,
    ) -> Self {
        Self {
            table: table.into(),
            bk_column: bk_column.into(),
            pk_column: pk_column.into(),
            config,
        }
    }

    /// Resolver using the derived `bk_<table>` / `key_<table>` column names.
    pub fn for_table(table: impl Into<String>, config: KeyConfig) -> Self {
        let table = table.into();
        let bk_column = config.bk_column_for(&table);
        let pk_column = config.pk_column_for(&table);
        Self::new(table, bk_column, pk_column, config)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn bk_column(&self) -> &str {
        &self.bk_column
    }

    pub fn pk_column(&self) -> &str {
        &self.pk_column
    }

    pub fn config(&self) -> &KeyConfig {
        &self.config
    }

    /// Check the business key column of an incoming batch.
    ///
    /// The column must exist, hold at least one non-null value, and contain
    /// no duplicate non-null values.
    pub fn validate(&self, batch: &RecordBatch) -> KeyResult<()> {
        let bk = batch.column_index(&self.bk_column).ok_or_else(|| {
            KeyError::schema(format!(
                "business key column '{}' not found in incoming batch for table '{}' (available: {})",
                self.bk_column,
                self.table,
                batch.columns().join(", ")
            ))
        })?;

        // Key text -> row indices, in first-seen order.
        let mut order: Vec<String> = Vec::new();
        let mut rows_by_key: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, row) in batch.rows().iter().enumerate() {
            if let Some(key) = row[bk].as_key_text() {
                let rows = rows_by_key.entry(key.clone()).or_default();
                if rows.is_empty() {
                    order.push(key);
                }
                rows.push(i);
            }
        }

        if order.is_empty() {
            return Err(KeyError::validation(format!(
                "no valid business key values found in column '{}' for table '{}' ({} rows, all null)",
                self.bk_column,
                self.table,
                batch.len()
            )));
        }

        let duplicates: Vec<&String> = order
            .iter()
            .filter(|key| rows_by_key[key.as_str()].len() > 1)
            .collect();
        if duplicates.is_empty() {
            return Ok(());
        }

        let affected: usize = duplicates.iter().map(|k| rows_by_key[k.as_str()].len()).sum();
        let sample_values: Vec<&str> = duplicates
            .iter()
            .take(self.config.max_sample_values)
            .map(|k| k.as_str())
            .collect();
        let sample_rows = batch
            .filter_rows(|row| {
                row[bk]
                    .as_key_text()
                    .is_some_and(|k| rows_by_key.get(&k).is_some_and(|r| r.len() > 1))
            })
            .head(self.config.max_sample_rows);

        Err(KeyError::validation(format!(
            "duplicate business keys in incoming batch for table '{}': column '{}', \
             {} distinct values over {} rows. Duplicate values: [{}]. Sample duplicate rows:\n{}",
            self.table,
            self.bk_column,
            duplicates.len(),
            affected,
            sample_values.join(", "),
            sample_rows
        )))
    }

    /// Read the persisted `(bk, pk)` pairs for this resolver's table.
    pub fn fetch(&self, store: &dyn KeyStore, filter: Option<&str>) -> KeyResult<RecordBatch> {
        let query = KeyPairQuery::new(&self.table, &self.bk_column, &self.pk_column)
            .with_filter(filter.map(str::to_string));

        let pairs = store
            .fetch_key_pairs(&query)
            .map_err(|e| self.store_error(e))?;

        for column in [&self.bk_column, &self.pk_column] {
            if !pairs.has_column(column) {
                return Err(KeyError::schema(format!(
                    "key store returned no column '{}' for table '{}' (got: {})",
                    column,
                    self.table,
                    pairs.columns().join(", ")
                )));
            }
        }

        debug!(table = %self.table, pairs = pairs.len(), "fetched key pairs");
        Ok(pairs)
    }

    /// Read the largest persisted surrogate key for this resolver's table.
    pub fn fetch_max_key(&self, store: &dyn KeyStore) -> KeyResult<i64> {
        store
            .fetch_max_key(&self.table, &self.pk_column)
            .map_err(|e| self.store_error(e))
    }

    fn store_error(&self, source: crate::store::StoreError) -> KeyError {
        KeyError::store_access(&self.table, &[self.bk_column.as_str(), self.pk_column.as_str()], source)
    }

    /// Left-join `pairs` onto `batch` by business key, attaching the PK column.
    ///
    /// Unmatched rows get a null PK. The result must have exactly as many rows
    /// as `batch`; growth means the persisted pairs repeat a business key.
    pub fn merge(&self, batch: &RecordBatch, pairs: &RecordBatch) -> KeyResult<RecordBatch> {
        let bk = batch.column_index(&self.bk_column).ok_or_else(|| {
            KeyError::schema(format!(
                "business key column '{}' not found in batch for table '{}'",
                self.bk_column, self.table
            ))
        })?;
        if batch.has_column(&self.pk_column) {
            return Err(KeyError::schema(format!(
                "batch for table '{}' already has a column '{}'; refusing to overwrite it with resolved keys",
                self.table, self.pk_column
            )));
        }
        let pair_bk = pairs.require_column(&self.bk_column, &self.table)?;
        let pair_pk = pairs.require_column(&self.pk_column, &self.table)?;

        let mut index: HashMap<String, Vec<&Value>> = HashMap::new();
        for row in pairs.rows() {
            if let Some(key) = row[pair_bk].as_key_text() {
                index.entry(key).or_default().push(&row[pair_pk]);
            }
        }

        let mut columns = batch.columns().to_vec();
        columns.push(self.pk_column.clone());

        let mut rows = Vec::with_capacity(batch.len());
        let mut matched = 0;
        let mut fanned_out: Vec<String> = Vec::new();
        for row in batch.rows() {
            let hits = row[bk].as_key_text().and_then(|key| {
                let hits = index.get(&key)?;
                if hits.len() > 1 && !fanned_out.contains(&key) {
                    fanned_out.push(key);
                }
                Some(hits)
            });
            match hits {
                Some(hits) => {
                    matched += 1;
                    for pk in hits {
                        let mut out = row.clone();
                        out.push((*pk).clone());
                        rows.push(out);
                    }
                }
                None => {
                    let mut out = row.clone();
                    out.push(Value::Null);
                    rows.push(out);
                }
            }
        }

        if rows.len() != batch.len() {
            let sample: Vec<&str> = fanned_out
                .iter()
                .take(self.config.max_sample_values)
                .map(String::as_str)
                .collect();
            return Err(KeyError::consistency(format!(
                "row count changed after merge for table '{}': {} incoming rows became {}; \
                 persisted key pairs repeat business keys in column '{}' ({} affected). Sample: [{}]",
                self.table,
                batch.len(),
                rows.len(),
                self.bk_column,
                fanned_out.len(),
                sample.join(", ")
            )));
        }

        debug!(
            table = %self.table,
            rows = rows.len(),
            matched,
            unmatched = rows.len() - matched,
            "merged key pairs"
        );
        Ok(RecordBatch::from_parts(columns, rows))
    }

    /// Largest surrogate key in a fetched pair set, 0 when it is empty.
    ///
    /// Every persisted key must be an integer; anything else, null included,
    /// is a consistency error.
    pub fn max_key(&self, pairs: &RecordBatch) -> KeyResult<i64> {
        let pk = pairs.require_column(&self.pk_column, &self.table)?;

        let mut max = 0;
        let mut bad: Vec<String> = Vec::new();
        for row in pairs.rows() {
            match row[pk].as_int() {
                Some(key) => max = max.max(key),
                None => bad.push(match &row[pk] {
                    Value::Null => "null".to_string(),
                    other => format!("{:?}", other.to_string()),
                }),
            }
        }

        if !bad.is_empty() {
            let sample: Vec<&str> = bad
                .iter()
                .take(self.config.max_sample_values)
                .map(String::as_str)
                .collect();
            return Err(KeyError::consistency(format!(
                "non-integer surrogate keys in persisted column '{}' of table '{}': {} rows. Sample: [{}]",
                self.pk_column,
                self.table,
                bad.len(),
                sample.join(", ")
            )));
        }
        Ok(max)
    }

    /// Convert every non-null value of the PK column to an integer.
    pub fn cast_keys(&self, batch: &mut RecordBatch) -> KeyResult<()> {
        let pk = batch.require_column(&self.pk_column, &self.table)?;
        for (i, row) in batch.rows_mut().iter_mut().enumerate() {
            if row[pk].is_null() {
                continue;
            }
            let key = row[pk].as_int().ok_or_else(|| {
                KeyError::consistency(format!(
                    "surrogate key {:?} in row {} of column '{}' (table '{}') is not an integer",
                    row[pk].to_string(),
                    i,
                    self.pk_column,
                    self.table
                ))
            })?;
            row[pk] = Value::Int(key);
        }
        Ok(())
    }

    /// Check that BK -> PK is injective over the rows where both are set.
    ///
    /// Fails if a business key carries two surrogate keys, or a surrogate key
    /// is shared by two business keys.
    pub fn assert_injective(&self, batch: &RecordBatch) -> KeyResult<()> {
        let bk = batch.require_column(&self.bk_column, &self.table)?;
        let pk = batch.require_column(&self.pk_column, &self.table)?;

        let mut pks_by_bk: HashMap<String, Vec<String>> = HashMap::new();
        let mut bks_by_pk: HashMap<String, Vec<String>> = HashMap::new();
        let mut order: Vec<(String, String)> = Vec::new();
        for row in batch.rows() {
            let (Some(b), Some(p)) = (row[bk].as_key_text(), row[pk].as_key_text()) else {
                continue;
            };
            let pks = pks_by_bk.entry(b.clone()).or_default();
            if pks.contains(&p) {
                continue;
            }
            pks.push(p.clone());
            bks_by_pk.entry(p.clone()).or_default().push(b.clone());
            order.push((b, p));
        }

        let mut conflicted: Vec<&(String, String)> = order
            .iter()
            .filter(|(b, p)| pks_by_bk[b].len() > 1 || bks_by_pk[p].len() > 1)
            .collect();
        if conflicted.is_empty() {
            return Ok(());
        }

        let multi_pk = pks_by_bk.values().filter(|v| v.len() > 1).count();
        let shared_pk = bks_by_pk.values().filter(|v| v.len() > 1).count();
        conflicted.truncate(self.config.max_sample_rows);
        let sample: Vec<String> = conflicted
            .iter()
            .map(|(b, p)| format!("{} -> {}", b, p))
            .collect();

        Err(KeyError::consistency(format!(
            "conflicting key pairs in table '{}' (bk_col={}, pk_col={}): \
             {} business keys map to multiple surrogate keys, {} surrogate keys are shared. Sample:\n{}",
            self.table,
            self.bk_column,
            self.pk_column,
            multi_pk,
            shared_pk,
            sample.join("\n")
        )))
    }
}
