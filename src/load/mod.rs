//! Load-mode planning and load SQL composition.
//!
//! [`resolve_load_plan`] is a pure function of dataset metadata. It picks
//! the load mode and decides whether delete detection and history apply.
//! [`compose_load_sql`] turns that plan into the ordered statements of one
//! load. Placeholders (`{{DELTA_CUTOFF}}`, `{{ load_timestamp }}`,
//! `{{ load_run_id }}`) survive composition untouched. The orchestrator
//! substitutes them right before execution.
//!
//! | strategy / materialization | mode        | statements                             |
//! |----------------------------|-------------|----------------------------------------|
//! | view                       | `View`      | CREATE [OR REPLACE] VIEW               |
//! | full                       | `Full`      | TRUNCATE + INSERT ... SELECT           |
//! | append                     | `Append`    | INSERT ... SELECT (incremental filter) |
//! | snapshot                   | `Snapshot`  | INSERT ... SELECT (whole upstream)     |
//! | merge / historize          | `Merge`     | MERGE or fallback, then delete         |
//! | generated `_hist`          | `Historize` | four SCD2 statements                   |

mod deletes;
mod history;
mod source;

pub use deletes::{delete_detection_statement, rewrite_incremental_filter};
pub use history::hist_statements;
pub use source::{build_source_query, row_hash_expr, SourceQuery, SOURCE_ALIAS};

use crate::metadata::{
    Catalog, Dataset, DatasetKey, IncrementalStrategy, Layer, Materialization, MetadataError,
    SystemRole,
};
use crate::sql::ddl::{self, ColumnSpec};
use crate::sql::dml::{Insert, MergeOptions, MergeStatement};
use crate::sql::expr::ObjectName;
use crate::sql::{Dialect, SqlDialect, SqlError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Configuration errors raised before any SQL is issued.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("dataset '{0}' uses merge but declares no natural key fields")]
    MissingNaturalKeys(String),

    #[error("dataset '{dataset}' cannot be loaded with strategy '{strategy}'")]
    UnsupportedStrategy { dataset: String, strategy: String },

    #[error("{dialect} does not implement {capability}")]
    CapabilityMissing {
        dialect: Dialect,
        capability: &'static str,
    },

    #[error("dataset '{0}' has no upstream, source or query to load from")]
    NoSource(String),

    #[error("column '{column}' of '{dataset}' has no active lineage from '{upstream}'")]
    MissingLineage {
        dataset: String,
        column: String,
        upstream: String,
    },

    #[error(
        "surrogate key '{column}' of '{dataset}' hashes [{}] but the natural key is [{}]",
        .hashed.join(", "),
        .natural_keys.join(", ")
    )]
    SurrogateKeyMismatch {
        dataset: String,
        column: String,
        hashed: Vec<String>,
        natural_keys: Vec<String>,
    },

    #[error("dataset '{dataset}' declares surrogate key '{column}' but schema '{schema}' disables surrogate keys")]
    SurrogateKeysDisabled {
        dataset: String,
        column: String,
        schema: String,
    },

    #[error("dataset '{dataset}' has no query tree and schema '{schema}' does not generate loads")]
    NotGenerated { dataset: String, schema: String },

    #[error("column '{column}' of '{dataset}' has unresolvable type '{datatype}'")]
    UnresolvedType {
        dataset: String,
        column: String,
        datatype: String,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Sql(#[from] SqlError),
}

impl LoadError {
    /// Configuration errors fail identically on every attempt.
    pub fn is_retriable(&self) -> bool {
        false
    }
}

pub type LoadResult<T> = Result<T, LoadError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    Full,
    Append,
    Merge,
    Snapshot,
    Historize,
    View,
}

impl LoadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadMode::Full => "full",
            LoadMode::Append => "append",
            LoadMode::Merge => "merge",
            LoadMode::Snapshot => "snapshot",
            LoadMode::Historize => "historize",
            LoadMode::View => "view",
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one dataset is loaded. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadPlan {
    pub dataset: DatasetKey,
    pub mode: LoadMode,
    pub handle_deletes: bool,
    /// A `_hist` shadow is maintained after this load.
    pub historize: bool,
}

/// Statements for one load, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSql {
    pub plan: LoadPlan,
    pub statements: Vec<String>,
}

/// Options threaded through composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    pub merge: MergeOptions,
}

/// Decide the load mode for `dataset`.
pub fn resolve_load_plan(catalog: &Catalog, dataset: &Dataset) -> LoadResult<LoadPlan> {
    let key = dataset.key();
    check_schema_policy(catalog, dataset)?;
    let plan = |mode, handle_deletes, historize| LoadPlan {
        dataset: key.clone(),
        mode,
        handle_deletes,
        historize,
    };

    match dataset.materialization {
        Materialization::View => return Ok(plan(LoadMode::View, false, false)),
        Materialization::ExternalPassthrough => {
            return Err(LoadError::UnsupportedStrategy {
                dataset: key.to_string(),
                strategy: "external_passthrough".into(),
            })
        }
        Materialization::Table | Materialization::Incremental => {}
    }

    if dataset.is_hist() {
        if dataset.natural_key_fields.is_empty() {
            return Err(LoadError::MissingNaturalKeys(key.to_string()));
        }
        return Ok(plan(LoadMode::Historize, false, false));
    }

    match dataset.incremental_strategy {
        IncrementalStrategy::Full => Ok(plan(LoadMode::Full, false, false)),
        IncrementalStrategy::Append => Ok(plan(LoadMode::Append, false, false)),
        IncrementalStrategy::Snapshot => Ok(plan(LoadMode::Snapshot, false, false)),
        IncrementalStrategy::Merge | IncrementalStrategy::Historize => {
            if dataset.natural_key_fields.is_empty() {
                return Err(LoadError::MissingNaturalKeys(key.to_string()));
            }
            let layer = catalog.schema_of(dataset)?.layer();
            let handle_deletes = dataset.handle_deletes && layer == Layer::Rawcore;
            if dataset.handle_deletes && !handle_deletes {
                log::warn!(
                    "delete detection ignored for {}: only rawcore datasets detect deletes",
                    key
                );
            }
            Ok(plan(
                LoadMode::Merge,
                handle_deletes,
                catalog.wants_history(dataset),
            ))
        }
    }
}

/// Schema flags that rule a dataset out before any SQL is built. Generated
/// `_hist` datasets follow their base and are exempt.
fn check_schema_policy(catalog: &Catalog, dataset: &Dataset) -> LoadResult<()> {
    if dataset.is_hist() {
        return Ok(());
    }
    let schema = catalog.schema_of(dataset)?;
    if !schema.surrogate_keys_enabled {
        if let Some(column) = dataset.column_with_role(SystemRole::SurrogateKey) {
            return Err(LoadError::SurrogateKeysDisabled {
                dataset: dataset.key().to_string(),
                column: column.name.clone(),
                schema: schema.name.clone(),
            });
        }
    }
    if !schema.generate_layer && dataset.query_root.is_none() {
        return Err(LoadError::NotGenerated {
            dataset: dataset.key().to_string(),
            schema: schema.name.clone(),
        });
    }
    Ok(())
}

/// Compose the full load of `key` for `dialect`.
pub fn compose_load_sql(
    catalog: &Catalog,
    key: &DatasetKey,
    dialect: Dialect,
    options: &LoadOptions,
) -> LoadResult<LoadSql> {
    let dataset = catalog.get(key)?;
    let plan = resolve_load_plan(catalog, dataset)?;
    check_capabilities(&plan, dialect)?;
    let target = ObjectName::new(Some(&dataset.schema), &dataset.name);

    let statements = match plan.mode {
        LoadMode::View => {
            let source = build_source_query(catalog, dataset, false)?;
            vec![ddl::create_view(
                dialect,
                Some(&dataset.schema),
                &dataset.name,
                &source.plan,
            )?]
        }
        LoadMode::Full => {
            let source = build_source_query(catalog, dataset, false)?;
            vec![
                ddl::truncate(dialect, Some(&dataset.schema), &dataset.name)?,
                Insert::new(target, source.columns, source.plan).to_sql(dialect)?,
            ]
        }
        LoadMode::Append | LoadMode::Snapshot => {
            let filtered = plan.mode == LoadMode::Append;
            let source = build_source_query(catalog, dataset, filtered)?;
            vec![Insert::new(target, source.columns, source.plan).to_sql(dialect)?]
        }
        LoadMode::Merge => {
            let source = build_source_query(catalog, dataset, true)?;
            let keys = &dataset.natural_key_fields;
            let surrogate = dataset.column_with_role(SystemRole::SurrogateKey);
            let update: Vec<String> = source
                .columns
                .iter()
                .filter(|c| !keys.iter().any(|k| k.eq_ignore_ascii_case(c)))
                .filter(|c| surrogate.is_none_or(|s| !s.name.eq_ignore_ascii_case(c)))
                .cloned()
                .collect();

            let mut statements = MergeStatement::new(target, source.plan)
                .keys(keys.iter().cloned())
                .update(update)
                .insert(source.columns)
                .options(options.merge)
                .render(dialect)?;
            if plan.handle_deletes {
                statements.push(delete_detection_statement(catalog, dataset, dialect)?);
            }
            statements
        }
        LoadMode::Historize => hist_statements(catalog, dataset, dialect)?,
    };

    log::debug!(
        "composed {} load of {}: {} statement(s)",
        plan.mode,
        key,
        statements.len()
    );
    Ok(LoadSql { plan, statements })
}

/// Declared columns as DDL column specs, in ordinal order.
pub fn column_specs(dataset: &Dataset) -> LoadResult<Vec<ColumnSpec>> {
    dataset
        .ordered_columns()
        .into_iter()
        .map(|c| {
            let data_type = c.data_type().ok_or_else(|| LoadError::UnresolvedType {
                dataset: dataset.key().to_string(),
                column: c.name.clone(),
                datatype: c.datatype.clone(),
            })?;
            let spec = ColumnSpec::new(&c.name, data_type);
            Ok(if c.nullable { spec } else { spec.not_null() })
        })
        .collect()
}

/// CREATE TABLE for a dataset that does not exist yet.
pub fn create_table_sql(dataset: &Dataset, dialect: Dialect) -> LoadResult<String> {
    Ok(ddl::create_table(
        dialect,
        Some(&dataset.schema),
        &dataset.name,
        &column_specs(dataset)?,
    )?)
}

/// Fail with `CapabilityMissing` unless `dialect` can run the plan.
/// [`compose_load_sql`] runs this before rendering anything.
pub fn check_capabilities(plan: &LoadPlan, dialect: Dialect) -> LoadResult<()> {
    if plan.handle_deletes && !dialect.supports_delete_detection() {
        return Err(LoadError::CapabilityMissing {
            dialect,
            capability: "delete detection",
        });
    }
    Ok(())
}
