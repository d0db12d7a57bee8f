//! TOML-based configuration for strata.
//!
//! Supports a config file (strata.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! profile = "prod"
//! target_system = "warehouse"
//! dialect = "snowflake"
//! catalog = "${STRATA_HOME}/catalog.json"
//!
//! [execution]
//! execute = true
//! continue_on_error = true
//! max_retries = 2
//!
//! [materialization]
//! allow_alter_column_type = false
//! ensure_schema = true
//!
//! [run_log]
//! enabled = true
//! schema = "meta"
//! table = "load_run_log"
//! ```

use crate::materialize::MaterializationPolicy;
use crate::orchestrator::ExecutionPolicy;
use crate::sql::Dialect;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
///
/// Built once at start-up and passed by reference.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Environment name recorded in snapshots, manifests and the run log.
    pub profile: String,

    /// Name of the target warehouse connection.
    pub target_system: String,

    pub dialect: Dialect,

    /// Path of the catalog JSON document (supports ${ENV_VAR} expansion).
    pub catalog: Option<String>,

    pub execution: ExecutionPolicy,

    pub materialization: MaterializationPolicy,

    pub run_log: RunLogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profile: "dev".to_string(),
            target_system: "warehouse".to_string(),
            dialect: Dialect::default(),
            catalog: None,
            execution: ExecutionPolicy::default(),
            materialization: MaterializationPolicy::default(),
            run_log: RunLogSettings::default(),
        }
    }
}

/// Run-log table settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunLogSettings {
    pub enabled: bool,
    pub schema: String,
    pub table: String,
}

impl Default for RunLogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            schema: "meta".to_string(),
            table: "load_run_log".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from an explicit path or the default locations.
    ///
    /// Searches in order:
    /// 1. `explicit` (the `--config` flag)
    /// 2. Environment variable `STRATA_CONFIG`
    /// 3. `./strata.toml`
    /// 4. `<config dir>/strata/config.toml`
    pub fn load(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Ok(path) = env::var("STRATA_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("strata.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("strata").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("no config file found, using defaults");
        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.profile.trim().is_empty() {
            return Err(SettingsError::InvalidConfig("profile must not be empty".into()));
        }
        if self.run_log.enabled && (self.run_log.schema.is_empty() || self.run_log.table.is_empty())
        {
            return Err(SettingsError::InvalidConfig(
                "run_log.schema and run_log.table are required when the run log is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Catalog path with environment variables expanded.
    pub fn catalog_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.catalog
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.next_if_eq(&'{').is_some() {
            let name: String = std::iter::from_fn(|| chars.next_if(|&ch| ch != '}')).collect();
            chars.next(); // '}'
            name
        } else {
            std::iter::from_fn(|| chars.next_if(|&ch| ch.is_alphanumeric() || ch == '_')).collect()
        };

        if var_name.is_empty() {
            // Just a lone $, keep it
            result.push('$');
            continue;
        }
        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_braces() {
        env::set_var("STRATA_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("${STRATA_TEST_VAR}").unwrap(), "hello");
        assert_eq!(
            expand_env_vars("prefix_${STRATA_TEST_VAR}_suffix").unwrap(),
            "prefix_hello_suffix"
        );
        env::remove_var("STRATA_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        env::set_var("STRATA_TEST_VAR2", "world");
        assert_eq!(expand_env_vars("$STRATA_TEST_VAR2").unwrap(), "world");
        assert_eq!(expand_env_vars("$STRATA_TEST_VAR2!").unwrap(), "world!");
        assert_eq!(expand_env_vars("cost: $ 5").unwrap(), "cost: $ 5");
        env::remove_var("STRATA_TEST_VAR2");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("${NONEXISTENT_VAR_12345}");
        assert!(matches!(result, Err(SettingsError::MissingEnvVar(v)) if v == "NONEXISTENT_VAR_12345"));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
profile = "prod"
dialect = "snowflake"
catalog = "./catalog.json"

[execution]
execute = true
max_retries = 2

[materialization]
allow_alter_column_type = true

[run_log]
schema = "ops"
"#;

        let settings = Settings::from_toml(toml).unwrap();

        assert_eq!(settings.profile, "prod");
        assert_eq!(settings.target_system, "warehouse");
        assert_eq!(settings.dialect, Dialect::Snowflake);
        assert!(settings.execution.execute);
        assert!(!settings.execution.continue_on_error);
        assert_eq!(settings.execution.max_retries, 2);
        assert!(settings.materialization.allow_alter_column_type);
        assert!(settings.materialization.ensure_schema);
        assert_eq!(settings.run_log.schema, "ops");
        assert_eq!(settings.run_log.table, "load_run_log");
        assert_eq!(
            settings.catalog_path().unwrap(),
            Some(PathBuf::from("./catalog.json"))
        );
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert_eq!(settings.dialect, Dialect::DuckDb);
        assert!(!settings.execution.execute);
        assert!(!settings.materialization.allow_alter_column_type);
        assert!(settings.run_log.enabled);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(
            Settings::from_toml("profile = \"\""),
            Err(SettingsError::InvalidConfig(_))
        ));
        assert!(matches!(
            Settings::from_toml("dialect = \"sybase\""),
            Err(SettingsError::ParseError(_))
        ));
    }
}
