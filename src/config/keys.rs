//! Key resolution constants, held as explicit configuration.

use serde::{Deserialize, Serialize};

use super::settings::SettingsError;

/// Tunables shared by the builder and the resolvers.
///
/// Passed explicitly into every component so that tests can vary them
/// without touching shared state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Separator placed between business key components.
    pub separator: String,

    /// Surrogate key written for unresolved fact references when missing keys
    /// are tolerated.
    pub missing_key_sentinel: i64,

    /// Maximum number of distinct offending values quoted in an error.
    pub max_sample_values: usize,

    /// Maximum number of offending rows quoted in an error.
    pub max_sample_rows: usize,

    /// Maximum number of unmatched business keys quoted for a fact mapping.
    pub max_missing_sample: usize,

    /// Prefix for derived business key column names (`bk_<table>`).
    pub bk_prefix: String,

    /// Prefix for derived surrogate key column names (`key_<table>`).
    pub pk_prefix: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            separator: "||".to_string(),
            missing_key_sentinel: -1,
            max_sample_values: 10,
            max_sample_rows: 20,
            max_missing_sample: 10,
            bk_prefix: "bk".to_string(),
            pk_prefix: "key".to_string(),
        }
    }
}

impl KeyConfig {
    /// Business key column name derived for a table.
    pub fn bk_column_for(&self, table: &str) -> String {
        format!("{}_{}", self.bk_prefix, table)
    }

    /// Surrogate key column name derived for a table.
    pub fn pk_column_for(&self, table: &str) -> String {
        format!("{}_{}", self.pk_prefix, table)
    }

    /// Reject settings the resolvers cannot work with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.separator.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "keys.separator must not be empty".to_string(),
            ));
        }
        // Allocated keys start at 1, so a positive sentinel could collide.
        if self.missing_key_sentinel > 0 {
            return Err(SettingsError::InvalidConfig(format!(
                "keys.missing_key_sentinel must be zero or negative, got {}",
                self.missing_key_sentinel
            )));
        }
        if self.bk_prefix.is_empty() || self.pk_prefix.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "keys.bk_prefix and keys.pk_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
