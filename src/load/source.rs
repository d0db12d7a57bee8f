//! The SELECT a load reads from.
//!
//! Generated datasets read their primary upstream and map every target
//! column through its active lineage edge. Platform columns are computed:
//! surrogate keys and row hashes are hashed from upstream values, run
//! metadata comes from placeholders. Datasets with an authored query tree
//! use that tree instead.

use super::{LoadError, LoadResult};
use crate::metadata::{Catalog, Column, Dataset, DatasetKey, SystemRole};
use crate::sql::expr::{cast, lit_null, placeholder, raw_sql, table_col, Expr};
use crate::sql::query::{QueryPlan, Select, SelectItem, TableRef};
use crate::sql::surrogate::{self, hash_named, DEFAULT_SEPARATOR};
use crate::sql::template::Placeholder;
use crate::sql::types::DataType;
use crate::sql::SqlError;

/// Alias of the upstream table in generated source queries.
pub const SOURCE_ALIAS: &str = "s";

/// A source query and the target columns it produces, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceQuery {
    pub columns: Vec<String>,
    pub plan: QueryPlan,
}

/// Build the source query of `dataset`.
///
/// With `apply_filter`, the dataset's incremental filter is added as the
/// WHERE clause verbatim: it is authored against upstream column names.
pub fn build_source_query(
    catalog: &Catalog,
    dataset: &Dataset,
    apply_filter: bool,
) -> LoadResult<SourceQuery> {
    if let Some(root) = dataset.query_root {
        let graph = catalog.query_graph();
        let contract = graph.infer_contract(root, catalog)?;
        return Ok(SourceQuery {
            columns: contract.columns,
            plan: graph.to_plan(root, catalog)?,
        });
    }

    let (from, upstream) = match (dataset.primary_upstream(), dataset.sources.first()) {
        (Some(upstream), _) => (
            TableRef::new(Some(&upstream.schema), &upstream.name),
            Some(upstream),
        ),
        (None, Some(source)) => (TableRef::new(source.schema.as_deref(), &source.table), None),
        (None, None) => return Err(LoadError::NoSource(dataset.key().to_string())),
    };

    let mut columns = vec![];
    let mut select = Select::new().from(from.with_alias(SOURCE_ALIAS));
    for column in dataset.ordered_columns() {
        let expr = column_expr(dataset, column, upstream)?;
        select = select.item(SelectItem::aliased(expr, &column.name));
        columns.push(column.name.clone());
    }
    if apply_filter {
        if let Some(filter) = &dataset.incremental_filter {
            select = select.filter(raw_sql(filter));
        }
    }

    Ok(SourceQuery {
        columns,
        plan: select.into(),
    })
}

fn column_expr(
    dataset: &Dataset,
    column: &Column,
    upstream: Option<&DatasetKey>,
) -> LoadResult<Expr> {
    let expr = match column.system_role {
        Some(SystemRole::SurrogateKey) => surrogate_key_expr(dataset, column, upstream)?,
        Some(SystemRole::RowHash) => {
            row_hash_expr(dataset, |c| upstream_value(dataset, c, upstream))?
        }
        Some(SystemRole::LoadRunId) => placeholder(Placeholder::LoadRunId),
        Some(SystemRole::LoadedAt) => placeholder(Placeholder::LoadTimestamp),
        _ => match upstream_value(dataset, column, upstream) {
            Ok(expr) => expr,
            Err(_) => {
                log::debug!(
                    "{}.{} has no lineage, loading NULL",
                    dataset.key(),
                    column.name
                );
                typed_null(column)
            }
        },
    };
    Ok(expr)
}

/// `s.<upstream column>`, or `s.<name>` for source-fed raw datasets.
fn upstream_value(
    dataset: &Dataset,
    column: &Column,
    upstream: Option<&DatasetKey>,
) -> LoadResult<Expr> {
    match upstream {
        None => Ok(table_col(SOURCE_ALIAS, &column.name)),
        Some(upstream) => column
            .source_in(upstream)
            .map(|src| table_col(SOURCE_ALIAS, src))
            .ok_or_else(|| LoadError::MissingLineage {
                dataset: dataset.key().to_string(),
                column: column.name.clone(),
                upstream: upstream.to_string(),
            }),
    }
}

fn typed_null(column: &Column) -> Expr {
    match column.data_type() {
        Some(dt) => cast(lit_null(), dt),
        None => lit_null(),
    }
}

/// Hash over the natural key fields. A surrogate expression on the
/// column may pick the separator but must name exactly those fields.
fn surrogate_key_expr(
    dataset: &Dataset,
    column: &Column,
    upstream: Option<&DatasetKey>,
) -> LoadResult<Expr> {
    let (names, separator) = match &column.surrogate_expression {
        Some(text) => {
            let parsed = surrogate::parse(text).map_err(SqlError::from)?;
            let names: Vec<String> = parsed.columns().into_iter().map(str::to_string).collect();
            check_surrogate_columns(dataset, column, &names)?;
            let separator = parsed.separator().unwrap_or(DEFAULT_SEPARATOR).to_string();
            (names, separator)
        }
        None => (dataset.natural_key_fields.clone(), DEFAULT_SEPARATOR.to_string()),
    };

    let mut components = Vec::with_capacity(names.len());
    for name in names {
        let key_column = dataset
            .column(&name)
            .ok_or_else(|| LoadError::MissingLineage {
                dataset: dataset.key().to_string(),
                column: name.clone(),
                upstream: upstream.map(|u| u.to_string()).unwrap_or_default(),
            })?;
        let value = upstream_value(dataset, key_column, upstream)?;
        components.push((key_column.name.clone(), value));
    }
    Ok(hash_named(components, &separator).map_err(SqlError::from)?)
}

fn check_surrogate_columns(dataset: &Dataset, column: &Column, hashed: &[String]) -> LoadResult<()> {
    let normalized = |names: &[String]| {
        let mut names: Vec<String> = names.iter().map(|n| n.to_ascii_lowercase()).collect();
        names.sort();
        names.dedup();
        names
    };
    let hashed = normalized(hashed);
    let natural_keys = normalized(&dataset.natural_key_fields);
    if hashed != natural_keys {
        return Err(LoadError::SurrogateKeyMismatch {
            dataset: dataset.key().to_string(),
            column: column.name.clone(),
            hashed,
            natural_keys,
        });
    }
    Ok(())
}

/// Hash over the non-key business columns, sorted by name. Falls back to
/// every business column when all of them are keys.
pub fn row_hash_expr(
    dataset: &Dataset,
    value: impl Fn(&Column) -> LoadResult<Expr>,
) -> LoadResult<Expr> {
    let is_key = |c: &Column| {
        dataset
            .natural_key_fields
            .iter()
            .any(|k| k.eq_ignore_ascii_case(&c.name))
    };
    let business = dataset.business_columns();
    let mut hashed: Vec<&Column> = business.iter().copied().filter(|c| !is_key(*c)).collect();
    if hashed.is_empty() {
        hashed = business;
    }

    let components = hashed
        .into_iter()
        .map(|c| Ok((c.name.clone(), value(c)?)))
        .collect::<LoadResult<Vec<_>>>()?;
    Ok(hash_named(components, DEFAULT_SEPARATOR).map_err(SqlError::from)?)
}

/// `CAST(NULL AS TIMESTAMP)`, used for open validity bounds.
pub(crate) fn null_timestamp() -> Expr {
    cast(lit_null(), DataType::Timestamp)
}
