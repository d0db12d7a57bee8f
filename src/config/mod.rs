//! Configuration module for strata.
//!
//! Handles the settings file and environment variable expansion.

mod settings;

pub use settings::{expand_env_vars, RunLogSettings, Settings, SettingsError};
