//! Configuration module for starkeys.
//!
//! Holds the key resolution tunables and the TOML settings file.

mod keys;
mod settings;

pub use keys::KeyConfig;
pub use settings::{
    expand_env_vars, LoggingSettings, Settings, SettingsError, StoreSettings,
};
