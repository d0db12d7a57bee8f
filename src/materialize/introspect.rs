//! Live schema introspection.
//!
//! The planner only sees the warehouse through [`SchemaIntrospector`].
//! Connectors implement it over their catalog views; [`StaticIntrospector`]
//! answers from a fixed description and backs dry runs and tests.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntrospectError {
    #[error("introspection unavailable: {0}")]
    Unavailable(String),

    #[error("failed to introspect {object}: {message}")]
    Query { object: String, message: String },

    #[error("failed to parse live schema description: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IntrospectResult<T> = Result<T, IntrospectError>;

/// A physical column as reported by the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveColumn {
    pub name: String,
    pub datatype: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

impl LiveColumn {
    pub fn new(name: &str, datatype: &str) -> Self {
        Self {
            name: name.to_string(),
            datatype: datatype.to_string(),
            nullable: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Read-only view of the live physical schema.
///
/// Existence and columns are separate questions: some drivers return no
/// columns for tables the session cannot describe, and an empty column
/// list must not be read as "table missing".
pub trait SchemaIntrospector {
    fn schema_exists(&self, schema: &str) -> IntrospectResult<bool>;

    fn table_exists(&self, schema: &str, table: &str) -> IntrospectResult<bool>;

    /// Columns of `schema.table`; empty when the table is missing.
    fn columns(&self, schema: &str, table: &str) -> IntrospectResult<Vec<LiveColumn>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTable {
    #[serde(default = "default_true")]
    pub exists: bool,
    #[serde(default)]
    pub columns: Vec<LiveColumn>,
}

/// Introspector answering from a fixed description.
///
/// ```json
/// { "schemas": ["rawcore"],
///   "tables": { "rawcore.rc_customer": { "columns": [{"name": "old_col", "datatype": "int"}] } } }
/// ```
///
/// Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticIntrospector {
    #[serde(default)]
    pub schemas: BTreeSet<String>,
    #[serde(default)]
    pub tables: BTreeMap<String, StaticTable>,
}

impl StaticIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> IntrospectResult<Self> {
        let parsed: StaticIntrospector = serde_json::from_str(json)?;
        Ok(Self {
            schemas: parsed.schemas.iter().map(|s| s.to_lowercase()).collect(),
            tables: parsed
                .tables
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
        })
    }

    /// Declare `schema.table` with `columns`; also declares the schema.
    pub fn with_table(mut self, schema: &str, table: &str, columns: Vec<LiveColumn>) -> Self {
        self.schemas.insert(schema.to_lowercase());
        self.tables.insert(
            table_key(schema, table),
            StaticTable {
                exists: true,
                columns,
            },
        );
        self
    }

    /// Declare a table whose columns cannot be described.
    pub fn with_opaque_table(self, schema: &str, table: &str) -> Self {
        self.with_table(schema, table, vec![])
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schemas.insert(schema.to_lowercase());
        self
    }

    fn table(&self, schema: &str, table: &str) -> Option<&StaticTable> {
        self.tables.get(&table_key(schema, table))
    }
}

fn table_key(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table).to_lowercase()
}

impl SchemaIntrospector for StaticIntrospector {
    fn schema_exists(&self, schema: &str) -> IntrospectResult<bool> {
        Ok(self.schemas.contains(&schema.to_lowercase()))
    }

    fn table_exists(&self, schema: &str, table: &str) -> IntrospectResult<bool> {
        Ok(self.table(schema, table).is_some_and(|t| t.exists))
    }

    fn columns(&self, schema: &str, table: &str) -> IntrospectResult<Vec<LiveColumn>> {
        Ok(self
            .table(schema, table)
            .filter(|t| t.exists)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_lookup_is_case_insensitive() {
        let live = StaticIntrospector::new().with_table(
            "RawCore",
            "RC_Customer",
            vec![LiveColumn::new("id", "int")],
        );
        assert!(live.schema_exists("rawcore").unwrap());
        assert!(live.table_exists("rawcore", "rc_customer").unwrap());
        assert_eq!(live.columns("RAWCORE", "rc_customer").unwrap().len(), 1);
        assert!(!live.table_exists("rawcore", "other").unwrap());
        assert!(live.columns("rawcore", "other").unwrap().is_empty());
    }

    #[test]
    fn test_from_json() {
        let live = StaticIntrospector::from_json(
            r#"{"schemas": ["Stage"],
                "tables": {"Stage.Ghost": {"exists": false},
                           "stage.stg_customer": {"columns": [{"name": "CustomerID", "datatype": "int"}]}}}"#,
        )
        .unwrap();
        assert!(live.schema_exists("stage").unwrap());
        assert!(!live.table_exists("stage", "ghost").unwrap());
        assert_eq!(
            live.columns("stage", "stg_customer").unwrap(),
            vec![LiveColumn::new("CustomerID", "int")]
        );
    }
}
