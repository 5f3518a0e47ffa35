//! Dimension key propagation into fact tables.

use tracing::{debug, info, warn};

use super::{KeyResolver, ResolutionState};
use crate::batch::{RecordBatch, Value};
use crate::config::KeyConfig;
use crate::error::{KeyError, KeyResult};
use crate::store::KeyStore;

/// What to do with fact rows whose dimension reference has no persisted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingKeyPolicy {
    /// Raise a validation error.
    Fail,
    /// Write the configured sentinel key (`-1` by default).
    Sentinel,
}

impl MissingKeyPolicy {
    pub fn from_fail_on_missing(fail_on_missing: bool) -> Self {
        if fail_on_missing {
            MissingKeyPolicy::Fail
        } else {
            MissingKeyPolicy::Sentinel
        }
    }
}

/// A fact's reference to one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionMapping {
    /// Dimension table the keys are read from.
    pub dimension: String,
    /// Business key column, shared by the fact batch and the dimension table.
    pub bk_column: String,
    /// Surrogate key column read from the dimension and attached to the fact.
    pub pk_column: String,
    /// Per-mapping policy; `None` uses the mapper's default.
    pub missing: Option<MissingKeyPolicy>,
    /// Opaque filter narrowing the dimension's pairs.
    pub filter: Option<String>,
}

impl DimensionMapping {
    /// Mapping with the derived `bk_<dimension>` / `key_<dimension>` columns.
    pub fn new(dimension: impl Into<String>, config: &KeyConfig) -> Self {
        let dimension = dimension.into();
        Self {
            bk_column: config.bk_column_for(&dimension),
            pk_column: config.pk_column_for(&dimension),
            dimension,
            missing: None,
            filter: None,
        }
    }

    pub fn bk_column(mut self, name: impl Into<String>) -> Self {
        self.bk_column = name.into();
        self
    }

    pub fn pk_column(mut self, name: impl Into<String>) -> Self {
        self.pk_column = name.into();
        self
    }

    pub fn missing(mut self, policy: MissingKeyPolicy) -> Self {
        self.missing = Some(policy);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Replaces a fact batch's dimension business keys with surrogate keys.
///
/// Dimensions are resolved in registration order. Facts never mint keys:
/// an unmatched reference either fails the resolution or, when tolerated,
/// receives the sentinel key. Once every dimension is resolved the business
/// key columns are dropped and only the surrogate key columns remain.
///
/// # Example
///
/// ```ignore
/// let mut fact = FactKeyMapper::new("sales", &batch, &store);
/// fact.register("customer", None, None).register("product", None, None);
/// let resolved = fact.resolve()?;
/// ```
pub struct FactKeyMapper<'a> {
    table: String,
    store: &'a dyn KeyStore,
    config: KeyConfig,
    default_policy: MissingKeyPolicy,
    mappings: Vec<DimensionMapping>,
    resolved: Vec<DimensionMapping>,
    working: RecordBatch,
    state: ResolutionState,
}

impl<'a> FactKeyMapper<'a> {
    pub fn new(table: impl Into<String>, batch: &RecordBatch, store: &'a dyn KeyStore) -> Self {
        Self {
            table: table.into(),
            store,
            config: KeyConfig::default(),
            default_policy: MissingKeyPolicy::Fail,
            mappings: Vec::new(),
            resolved: Vec::new(),
            working: batch.clone(),
            state: ResolutionState::Unprocessed,
        }
    }

    pub fn with_config(mut self, config: KeyConfig) -> Self {
        self.config = config;
        self
    }

    /// Default policy for mappings that do not set their own.
    ///
    /// `true` (the default) fails on unresolved references; `false` writes the
    /// sentinel key instead.
    pub fn fail_on_missing(mut self, fail_on_missing: bool) -> Self {
        self.default_policy = MissingKeyPolicy::from_fail_on_missing(fail_on_missing);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    pub fn is_processed(&self) -> bool {
        self.state.is_processed()
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.working
    }

    /// Mappings waiting to be resolved.
    pub fn mappings(&self) -> &[DimensionMapping] {
        &self.mappings
    }

    /// Mappings consumed by a successful resolution.
    pub fn resolved_mappings(&self) -> &[DimensionMapping] {
        &self.resolved
    }

    /// Register a dimension reference, defaulting the column names.
    ///
    /// Registering a name again replaces its columns but keeps its position.
    pub fn register(
        &mut self,
        dimension: &str,
        bk_column: Option<&str>,
        pk_column: Option<&str>,
    ) -> &mut Self {
        let mut mapping = DimensionMapping::new(dimension, &self.config);
        if let Some(bk) = bk_column {
            mapping = mapping.bk_column(bk);
        }
        if let Some(pk) = pk_column {
            mapping = mapping.pk_column(pk);
        }
        self.register_mapping(mapping)
    }

    /// Register several dimensions with default column names.
    pub fn register_all<I, S>(&mut self, dimensions: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for dimension in dimensions {
            self.register(dimension.as_ref(), None, None);
        }
        self
    }

    /// Register a fully specified mapping.
    pub fn register_mapping(&mut self, mapping: DimensionMapping) -> &mut Self {
        match self
            .mappings
            .iter_mut()
            .find(|m| m.dimension == mapping.dimension)
        {
            Some(existing) => *existing = mapping,
            None => self.mappings.push(mapping),
        }
        self
    }

    /// Resolve every registered dimension. Idempotent once it has succeeded.
    pub fn resolve(&mut self) -> KeyResult<&RecordBatch> {
        if self.state.is_processed() {
            debug!(table = %self.table, "fact already resolved");
            return Ok(&self.working);
        }
        if self.mappings.is_empty() {
            return Err(KeyError::configuration(format!(
                "no dimensions registered for fact table '{}'; call register() or register_all() first",
                self.table
            )));
        }

        let mut batch = self.working.clone();
        for mapping in &self.mappings {
            batch = self.resolve_dimension(batch, mapping)?;
        }

        let bk_columns: Vec<&str> = self.mappings.iter().map(|m| m.bk_column.as_str()).collect();
        batch.drop_columns(&bk_columns);

        if batch.len() != self.working.len() {
            return Err(KeyError::consistency(format!(
                "fact table '{}' changed from {} to {} rows during resolution",
                self.table,
                self.working.len(),
                batch.len()
            )));
        }

        info!(
            table = %self.table,
            rows = batch.len(),
            dimensions = self.mappings.len(),
            "fact resolved"
        );

        self.working = batch;
        self.resolved = std::mem::take(&mut self.mappings);
        self.state = ResolutionState::Processed;
        Ok(&self.working)
    }

    fn resolve_dimension(
        &self,
        batch: RecordBatch,
        mapping: &DimensionMapping,
    ) -> KeyResult<RecordBatch> {
        if !batch.has_column(&mapping.bk_column) {
            return Err(KeyError::schema(format!(
                "fact business key column '{}' for dimension '{}' missing from incoming batch for fact table '{}' (available: {})",
                mapping.bk_column,
                mapping.dimension,
                self.table,
                batch.columns().join(", ")
            )));
        }

        let resolver = KeyResolver::new(
            &mapping.dimension,
            &mapping.bk_column,
            &mapping.pk_column,
            self.config.clone(),
        );
        let pairs = resolver.fetch(self.store, mapping.filter.as_deref())?;
        let mut merged = resolver.merge(&batch, &pairs)?;

        let bk = batch.require_column(&mapping.bk_column, &self.table)?;
        let pk = merged.require_column(&mapping.pk_column, &self.table)?;
        let missing: Vec<usize> = merged
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| row[pk].is_null())
            .map(|(i, _)| i)
            .collect();

        if !missing.is_empty() {
            let policy = mapping.missing.unwrap_or(self.default_policy);
            match policy {
                MissingKeyPolicy::Fail => {
                    let sample: Vec<String> = missing
                        .iter()
                        .take(self.config.max_missing_sample)
                        .map(|&i| match &merged.rows()[i][bk] {
                            Value::Null => "null".to_string(),
                            other => other.to_string(),
                        })
                        .collect();
                    return Err(KeyError::validation(format!(
                        "missing dimension keys for {} rows when mapping {} -> {} from '{}' \
                         (fact table '{}'). Sample missing BKs: [{}]",
                        missing.len(),
                        mapping.bk_column,
                        mapping.pk_column,
                        mapping.dimension,
                        self.table,
                        sample.join(", ")
                    )));
                }
                MissingKeyPolicy::Sentinel => {
                    let sentinel = self.config.missing_key_sentinel;
                    warn!(
                        table = %self.table,
                        dimension = %mapping.dimension,
                        rows = missing.len(),
                        sentinel,
                        "unresolved dimension references set to sentinel key"
                    );
                    let rows = merged.rows_mut();
                    for &i in &missing {
                        rows[i][pk] = Value::Int(sentinel);
                    }
                }
            }
        }

        resolver.cast_keys(&mut merged)?;
        debug!(
            table = %self.table,
            dimension = %mapping.dimension,
            unresolved = missing.len(),
            "dimension keys mapped"
        );
        Ok(merged)
    }

    /// Resolve if needed and hand over the resolved batch.
    pub fn into_batch(mut self) -> KeyResult<RecordBatch> {
        self.resolve()?;
        Ok(self.working)
    }
}
