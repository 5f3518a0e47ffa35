//! Surrogate key assignment for dimension tables.

use tracing::{debug, info};

use super::{KeyResolver, ResolutionState};
use crate::batch::{RecordBatch, Value};
use crate::config::KeyConfig;
use crate::error::{KeyError, KeyResult};
use crate::store::KeyStore;

/// Optional settings for a [`DimensionKeyAssigner`].
#[derive(Debug, Clone, Default)]
pub struct DimensionOptions {
    /// Business key column; defaults to `bk_<table>`.
    pub bk_column: Option<String>,
    /// Surrogate key column; defaults to `key_<table>`.
    pub pk_column: Option<String>,
    /// Opaque filter narrowing which persisted pairs are fetched.
    pub filter: Option<String>,
    pub config: KeyConfig,
}

impl DimensionOptions {
    pub fn bk_column(mut self, name: impl Into<String>) -> Self {
        self.bk_column = Some(name.into());
        self
    }

    pub fn pk_column(mut self, name: impl Into<String>) -> Self {
        self.pk_column = Some(name.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn config(mut self, config: KeyConfig) -> Self {
        self.config = config;
        self
    }
}

/// Resolves a dimension batch and allocates keys for unseen business keys.
///
/// New keys run contiguously from one above the largest persisted key, in
/// row order. The assigner only reads the store; inserting the rows from
/// [`new_rows`](Self::new_rows) is up to the caller, who must also ensure no
/// other writer allocates keys for the same table in the meantime.
///
/// # Example
///
/// ```ignore
/// let mut dim = DimensionKeyAssigner::new("customer", &batch, &store)?;
/// let resolved = dim.process()?;
/// let to_insert = dim.new_rows()?;
/// ```
pub struct DimensionKeyAssigner<'a> {
    resolver: KeyResolver,
    store: &'a dyn KeyStore,
    filter: Option<String>,
    working: RecordBatch,
    existing: Option<RecordBatch>,
    initial_max_key: Option<i64>,
    new_row_indices: Vec<usize>,
    state: ResolutionState,
}

impl<'a> DimensionKeyAssigner<'a> {
    /// Assigner for `table` with derived column names and default config.
    pub fn new(table: &str, batch: &RecordBatch, store: &'a dyn KeyStore) -> KeyResult<Self> {
        Self::with_options(table, batch, store, DimensionOptions::default())
    }

    /// Assigner with explicit options.
    ///
    /// The incoming batch is validated here, before any store access.
    pub fn with_options(
        table: &str,
        batch: &RecordBatch,
        store: &'a dyn KeyStore,
        options: DimensionOptions,
    ) -> KeyResult<Self> {
        let config = options.config;
        let bk_column = options
            .bk_column
            .unwrap_or_else(|| config.bk_column_for(table));
        let pk_column = options
            .pk_column
            .unwrap_or_else(|| config.pk_column_for(table));
        let resolver = KeyResolver::new(table, bk_column, pk_column, config);

        resolver.validate(batch)?;

        Ok(Self {
            resolver,
            store,
            filter: options.filter,
            working: batch.clone(),
            existing: None,
            initial_max_key: None,
            new_row_indices: Vec::new(),
            state: ResolutionState::Unprocessed,
        })
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    pub fn is_processed(&self) -> bool {
        self.state.is_processed()
    }

    /// The working batch: the input copy before processing, the resolved batch after.
    pub fn batch(&self) -> &RecordBatch {
        &self.working
    }

    /// Persisted pairs read during processing.
    pub fn existing_pairs(&self) -> Option<&RecordBatch> {
        self.existing.as_ref()
    }

    /// Largest persisted key seen when allocating, once processed.
    pub fn initial_max_key(&self) -> Option<i64> {
        self.initial_max_key
    }

    /// Fetch, merge and allocate. Idempotent once it has succeeded.
    pub fn process(&mut self) -> KeyResult<&RecordBatch> {
        if self.state.is_processed() {
            debug!(table = %self.resolver.table(), "dimension already processed");
            return Ok(&self.working);
        }

        let pairs = self.resolver.fetch(self.store, self.filter.as_deref())?;
        let mut merged = self.resolver.merge(&self.working, &pairs)?;
        self.resolver.assert_injective(&merged)?;

        let mut current_max = self.resolver.max_key(&pairs)?;
        if self.filter.is_some() {
            // A filtered fetch only sees part of the key space.
            current_max = current_max.max(self.resolver.fetch_max_key(self.store)?);
        }

        let new_rows = self.assign_new_keys(&mut merged, current_max)?;
        self.resolver.cast_keys(&mut merged)?;
        self.resolver.assert_injective(&merged)?;

        if let (Some(first), Some(last)) = (new_rows.first(), new_rows.last()) {
            let pk = self.resolver.pk_column();
            info!(
                table = %self.resolver.table(),
                assigned = new_rows.len(),
                first_key = ?merged.value(*first, pk),
                last_key = ?merged.value(*last, pk),
                "assigned new surrogate keys"
            );
        }
        info!(
            table = %self.resolver.table(),
            rows = merged.len(),
            existing = merged.len() - new_rows.len(),
            "dimension resolved"
        );

        self.working = merged;
        self.existing = Some(pairs);
        self.initial_max_key = Some(current_max);
        self.new_row_indices = new_rows;
        self.state = ResolutionState::Processed;
        Ok(&self.working)
    }

    /// Fill null PKs with `current_max + 1 ..` in row order.
    ///
    /// Returns the indices of the rows that received a key.
    fn assign_new_keys(&self, batch: &mut RecordBatch, current_max: i64) -> KeyResult<Vec<usize>> {
        let pk = batch.require_column(self.resolver.pk_column(), self.resolver.table())?;

        let unresolved: Vec<usize> = batch
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| row[pk].is_null())
            .map(|(i, _)| i)
            .collect();
        if unresolved.is_empty() {
            return Ok(unresolved);
        }

        let overflow = || {
            KeyError::consistency(format!(
                "surrogate key space of table '{}' exhausted: cannot allocate {} keys above {}",
                self.resolver.table(),
                unresolved.len(),
                current_max
            ))
        };

        let rows = batch.rows_mut();
        let mut next = current_max;
        for &i in &unresolved {
            next = next.checked_add(1).ok_or_else(overflow)?;
            rows[i][pk] = Value::Int(next);
        }
        Ok(unresolved)
    }

    /// Rows whose business key was not yet persisted, with their new keys.
    ///
    /// These are the rows a caller has to insert into the dimension table.
    pub fn new_rows(&self) -> KeyResult<RecordBatch> {
        if !self.state.is_processed() {
            return Err(KeyError::configuration(format!(
                "dimension '{}' has not been processed; call process() first",
                self.resolver.table()
            )));
        }

        let rows = self
            .new_row_indices
            .iter()
            .filter_map(|&i| self.working.row(i).map(<[Value]>::to_vec))
            .collect();
        Ok(RecordBatch::from_parts(self.working.columns().to_vec(), rows))
    }

    /// Process if needed and hand over the resolved batch.
    pub fn into_batch(mut self) -> KeyResult<RecordBatch> {
        self.process()?;
        Ok(self.working)
    }
}
