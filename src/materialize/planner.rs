//! Additive DDL planning against the live schema.
//!
//! The planner reads the live table through a [`SchemaIntrospector`] and
//! plans the smallest additive change that brings it in line with the
//! declared columns. It never executes anything, never drops, and never
//! creates the base table: a missing table is reported and left to the
//! load. Type changes are planned only when the policy allows them and
//! the dialect can express them.
//!
//! Every warning and blocking error starts with a `CODE:` tag:
//!
//! | code                    | meaning                                          |
//! |-------------------------|--------------------------------------------------|
//! | `MISSING_TABLE`         | table and all former names absent, nothing planned |
//! | `NO_COLUMNS_RETURNED`   | table exists but introspection returned no columns |
//! | `AMBIGUOUS_TABLE_RENAME`| several former table names exist                 |
//! | `AMBIGUOUS_RENAME`      | several former column names exist                |
//! | `TYPE_DRIFT`            | live type differs from the declared type         |
//! | `TYPE_UNKNOWN`          | a type could not be parsed for comparison        |
//! | `SCHEMA_NOT_CREATABLE`  | schema missing and the dialect cannot create it  |
//! | `UNRESOLVED_TYPE`       | a column to add has no known type (blocking)     |

use super::introspect::{IntrospectResult, LiveColumn, SchemaIntrospector};
use super::types::{compare_types, TypeComparison};
use crate::metadata::{Column, Dataset, DatasetKey, SystemRole};
use crate::sql::ddl::{self, ColumnSpec};
use crate::sql::{DataType, Dialect, SqlDialect, SqlResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Knobs of the materialization planner. Everything beyond additive
/// changes is off by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializationPolicy {
    /// Plan `ALTER COLUMN ... TYPE` on drift instead of warning.
    pub allow_alter_column_type: bool,
    /// Plan `CREATE SCHEMA` when the schema is missing.
    pub ensure_schema: bool,
}

impl Default for MaterializationPolicy {
    fn default() -> Self {
        Self {
            allow_alter_column_type: false,
            ensure_schema: true,
        }
    }
}

/// One planned DDL operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlStep {
    EnsureSchema {
        schema: String,
    },
    RenameTable {
        schema: String,
        from: String,
        to: String,
    },
    RenameColumn {
        schema: String,
        table: String,
        from: String,
        to: String,
    },
    AddColumn {
        schema: String,
        table: String,
        column: ColumnSpec,
    },
    AlterColumnType {
        schema: String,
        table: String,
        column: String,
        data_type: DataType,
    },
}

impl DdlStep {
    pub fn kind(&self) -> &'static str {
        match self {
            DdlStep::EnsureSchema { .. } => "ENSURE_SCHEMA",
            DdlStep::RenameTable { .. } => "RENAME_TABLE",
            DdlStep::RenameColumn { .. } => "RENAME_COLUMN",
            DdlStep::AddColumn { .. } => "ADD_COLUMN",
            DdlStep::AlterColumnType { .. } => "ALTER_COLUMN_TYPE",
        }
    }

    pub fn render(&self, dialect: Dialect) -> SqlResult<String> {
        match self {
            DdlStep::EnsureSchema { schema } => ddl::create_schema(dialect, schema),
            DdlStep::RenameTable { schema, from, to } => {
                ddl::rename_table(dialect, Some(schema), from, to)
            }
            DdlStep::RenameColumn {
                schema,
                table,
                from,
                to,
            } => ddl::rename_column(dialect, Some(schema), table, from, to),
            DdlStep::AddColumn {
                schema,
                table,
                column,
            } => ddl::add_column(dialect, Some(schema), table, column),
            DdlStep::AlterColumnType {
                schema,
                table,
                column,
                data_type,
            } => ddl::alter_column_type(dialect, Some(schema), table, column, data_type),
        }
    }
}

/// Result of planning one dataset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaterializationPlan {
    pub dataset: Option<DatasetKey>,
    pub steps: Vec<DdlStep>,
    pub warnings: Vec<String>,
    pub blocking_errors: Vec<String>,
    /// A rename moved existing data under a new name; downstream history
    /// or derived columns may need a backfill.
    pub requires_backfill: bool,
    /// The physical table exists (possibly under a former name).
    pub table_exists: bool,
}

impl MaterializationPlan {
    pub fn is_blocked(&self) -> bool {
        !self.blocking_errors.is_empty()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.steps.iter().filter(|s| s.kind() == kind).count()
    }

    /// Render every step; blocked plans render nothing.
    pub fn render(&self, dialect: Dialect) -> SqlResult<Vec<String>> {
        if self.is_blocked() {
            return Ok(vec![]);
        }
        self.steps.iter().map(|s| s.render(dialect)).collect()
    }

    fn warn(&mut self, code: &str, message: String) {
        log::warn!("{}: {}", code, message);
        self.warnings.push(format!("{}: {}", code, message));
    }

    fn block(&mut self, code: &str, message: String) {
        self.blocking_errors.push(format!("{}: {}", code, message));
    }
}

/// Plan the DDL that evolves the live table of `dataset`.
///
/// Step order: ensure schema, rename table, rename columns, add columns,
/// alter column types. Introspection failures propagate; everything else
/// ends up in the plan.
pub fn build_plan(
    dataset: &Dataset,
    live: &dyn SchemaIntrospector,
    dialect: Dialect,
    policy: &MaterializationPolicy,
) -> IntrospectResult<MaterializationPlan> {
    let key = dataset.key();
    let schema = dataset.schema.as_str();
    let mut plan = MaterializationPlan {
        dataset: Some(key.clone()),
        ..Default::default()
    };

    if policy.ensure_schema && !live.schema_exists(schema)? {
        if dialect.emit_create_schema(schema).is_some() {
            plan.steps.push(DdlStep::EnsureSchema {
                schema: schema.to_string(),
            });
        } else {
            plan.warn(
                "SCHEMA_NOT_CREATABLE",
                format!("schema '{}' is missing and {} cannot create it", schema, dialect),
            );
        }
    }

    // Resolve the physical table before diffing columns: the diff must
    // read the table the data actually lives in.
    let physical = if live.table_exists(schema, &dataset.name)? {
        dataset.name.clone()
    } else {
        let mut found = vec![];
        for former in &dataset.former_names {
            if live.table_exists(schema, former)? && !found.contains(former) {
                found.push(former.clone());
            }
        }
        match found.as_slice() {
            [] => {
                plan.warn(
                    "MISSING_TABLE",
                    format!("{} does not exist; table creation is left to the load", key),
                );
                return Ok(plan);
            }
            [former] => {
                plan.steps.push(DdlStep::RenameTable {
                    schema: schema.to_string(),
                    from: former.clone(),
                    to: dataset.name.clone(),
                });
                plan.requires_backfill = true;
                former.clone()
            }
            many => {
                plan.warn(
                    "AMBIGUOUS_TABLE_RENAME",
                    format!(
                        "{} matches former tables [{}]; manual cleanup required",
                        key,
                        many.join(", ")
                    ),
                );
                return Ok(plan);
            }
        }
    };
    plan.table_exists = true;

    let live_columns: BTreeMap<String, LiveColumn> = live
        .columns(schema, &physical)?
        .into_iter()
        .map(|c| (c.name.to_lowercase(), c))
        .collect();
    if live_columns.is_empty() {
        plan.warn(
            "NO_COLUMNS_RETURNED",
            format!(
                "{} exists but introspection returned no columns; every declared column is planned as ADD COLUMN",
                key
            ),
        );
    }

    let declared: BTreeSet<String> = dataset
        .columns
        .iter()
        .map(|c| c.name.to_lowercase())
        .collect();
    let mut claimed: BTreeSet<String> = BTreeSet::new();
    let mut renames = vec![];
    let mut adds = vec![];
    let mut alters = vec![];

    for column in dataset.ordered_columns() {
        match live_columns.get(&column.name.to_lowercase()) {
            Some(existing) => {
                if let Some(step) = compare_column(&mut plan, dataset, column, existing, dialect, policy)
                {
                    alters.push(step);
                }
            }
            None => {
                let matches: Vec<&LiveColumn> = rename_candidates(dataset, column)
                    .into_iter()
                    .filter(|c| !declared.contains(c) && !claimed.contains(c))
                    .filter_map(|c| live_columns.get(&c))
                    .collect();
                match matches.as_slice() {
                    [] => match column.data_type() {
                        Some(data_type) => adds.push(DdlStep::AddColumn {
                            schema: schema.to_string(),
                            table: dataset.name.clone(),
                            column: ColumnSpec::new(&column.name, data_type),
                        }),
                        None => plan.block(
                            "UNRESOLVED_TYPE",
                            format!(
                                "{}.{} has unresolvable type '{}'",
                                key, column.name, column.datatype
                            ),
                        ),
                    },
                    [former] => {
                        claimed.insert(former.name.to_lowercase());
                        plan.requires_backfill = true;
                        renames.push(DdlStep::RenameColumn {
                            schema: schema.to_string(),
                            table: dataset.name.clone(),
                            from: former.name.clone(),
                            to: column.name.clone(),
                        });
                    }
                    many => {
                        let names: Vec<&str> = many.iter().map(|c| c.name.as_str()).collect();
                        plan.warn(
                            "AMBIGUOUS_RENAME",
                            format!(
                                "{}.{} matches former columns [{}]; manual cleanup required",
                                key,
                                column.name,
                                names.join(", ")
                            ),
                        );
                    }
                }
            }
        }
    }

    plan.steps.extend(renames);
    plan.steps.extend(adds);
    plan.steps.extend(alters);
    log::debug!(
        "materialization plan for {}: {} step(s), {} warning(s)",
        key,
        plan.steps.len(),
        plan.warnings.len()
    );
    Ok(plan)
}

/// Former names to look for, lower-cased and de-duplicated in order.
///
/// Convention-named surrogate keys (`<dataset>_key`) follow dataset
/// renames, so `<former dataset>_key` is a candidate too.
fn rename_candidates(dataset: &Dataset, column: &Column) -> Vec<String> {
    let mut candidates: Vec<String> = column
        .former_names
        .iter()
        .map(|n| n.to_lowercase())
        .collect();
    let conventional = format!("{}_key", dataset.name).to_lowercase();
    if column.system_role == Some(SystemRole::SurrogateKey)
        && column.name.to_lowercase() == conventional
    {
        candidates.extend(
            dataset
                .former_names
                .iter()
                .map(|f| format!("{}_key", f).to_lowercase()),
        );
    }
    let mut seen = BTreeSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}

fn compare_column(
    plan: &mut MaterializationPlan,
    dataset: &Dataset,
    column: &Column,
    existing: &LiveColumn,
    dialect: Dialect,
    policy: &MaterializationPolicy,
) -> Option<DdlStep> {
    let key = dataset.key();
    match compare_types(dialect, &column.datatype, &existing.datatype) {
        TypeComparison::Same | TypeComparison::Benign => None,
        TypeComparison::Unknown => {
            plan.warn(
                "TYPE_UNKNOWN",
                format!(
                    "{}.{}: cannot compare declared '{}' with live '{}'",
                    key, column.name, column.datatype, existing.datatype
                ),
            );
            None
        }
        TypeComparison::Drift { declared, live } => {
            if policy.allow_alter_column_type && dialect.supports_alter_column_type() {
                return Some(DdlStep::AlterColumnType {
                    schema: dataset.schema.clone(),
                    table: dataset.name.clone(),
                    column: column.name.clone(),
                    data_type: declared,
                });
            }
            plan.warn(
                "TYPE_DRIFT",
                format!(
                    "{}.{}: declared {} but live is {}",
                    key, column.name, declared, live
                ),
            );
            None
        }
    }
}
