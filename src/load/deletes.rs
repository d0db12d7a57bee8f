//! Delete detection for merge loads.
//!
//! Target rows whose natural key no longer appears upstream are deleted.
//! The scan is scoped by the dataset's incremental filter, rewritten from
//! upstream column names to target column names, so an incremental load
//! only considers rows inside its own delta window.

use super::{LoadError, LoadResult, SOURCE_ALIAS};
use crate::metadata::{Catalog, Dataset};
use crate::sql::dml::Delete;
use crate::sql::expr::{
    and_all, lit_int, not_exists, qualified_col, raw_sql, table_col, ExprExt, ObjectName,
};
use crate::sql::query::{Select, TableRef};
use crate::sql::Dialect;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

/// Placeholders, string literals, identifiers and whitespace runs.
static FILTER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\{\{.*?\}\})|('(?:[^']|'')*')|([A-Za-z_][A-Za-z0-9_]*)|(\s+)").unwrap()
});

/// Rewrite an incremental filter authored against upstream column names
/// into target column names.
///
/// `lineage` maps lower-cased upstream names to target names and
/// `upstream_columns` holds the lower-cased upstream column names.
/// Identifiers match case-insensitively. An identifier naming an upstream
/// column without lineage to the target fails with that name; other
/// unmapped identifiers (keywords, functions) are kept as written.
/// Whitespace runs collapse to one space. Runtime placeholders and string
/// literals are left untouched.
pub fn rewrite_incremental_filter(
    filter: &str,
    lineage: &BTreeMap<String, String>,
    upstream_columns: &BTreeSet<String>,
) -> Result<String, String> {
    let mut out = String::with_capacity(filter.len());
    let mut last = 0;

    for caps in FILTER_TOKEN.captures_iter(filter) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&filter[last..whole.start()]);
        last = whole.end();

        if caps.get(4).is_some() {
            out.push(' ');
        } else if let Some(ident) = caps.get(3) {
            let lowered = ident.as_str().to_ascii_lowercase();
            match lineage.get(&lowered) {
                Some(target) => out.push_str(target),
                None if upstream_columns.contains(&lowered) => {
                    return Err(ident.as_str().to_string())
                }
                None => out.push_str(ident.as_str()),
            }
        } else {
            out.push_str(whole.as_str());
        }
    }
    out.push_str(&filter[last..]);
    Ok(out.trim().to_string())
}

/// `DELETE FROM target WHERE <filter> AND NOT EXISTS (upstream row)`.
pub fn delete_detection_statement(
    catalog: &Catalog,
    dataset: &Dataset,
    dialect: Dialect,
) -> LoadResult<String> {
    if dataset.natural_key_fields.is_empty() {
        return Err(LoadError::MissingNaturalKeys(dataset.key().to_string()));
    }
    let upstream_key = dataset
        .primary_upstream()
        .ok_or_else(|| LoadError::NoSource(dataset.key().to_string()))?;
    let upstream = catalog.get(upstream_key)?;

    let mut join = vec![];
    for key in &dataset.natural_key_fields {
        let source = dataset
            .column(key)
            .and_then(|c| c.source_in(upstream_key))
            .ok_or_else(|| LoadError::MissingLineage {
                dataset: dataset.key().to_string(),
                column: key.clone(),
                upstream: upstream_key.to_string(),
            })?;
        join.push(
            table_col(SOURCE_ALIAS, source)
                .eq(qualified_col(Some(&dataset.schema), &dataset.name, key)),
        );
    }
    let Some(join) = and_all(join) else {
        return Err(LoadError::MissingNaturalKeys(dataset.key().to_string()));
    };

    let still_upstream = Select::new()
        .item(lit_int(1))
        .from(TableRef::new(Some(&upstream.schema), &upstream.name).with_alias(SOURCE_ALIAS))
        .filter(join);

    let mut delete = Delete::from(ObjectName::new(Some(&dataset.schema), &dataset.name));
    if let Some(filter) = &dataset.incremental_filter {
        let upstream_columns: BTreeSet<String> = upstream
            .columns
            .iter()
            .map(|c| c.name.to_ascii_lowercase())
            .collect();
        let rewritten =
            rewrite_incremental_filter(filter, &dataset.lineage_map(upstream_key), &upstream_columns)
                .map_err(|column| LoadError::MissingLineage {
                    dataset: dataset.key().to_string(),
                    column,
                    upstream: upstream_key.to_string(),
                })?;
        delete = delete.filter(raw_sql(&format!("({})", rewritten)));
    }
    delete = delete.filter(not_exists(still_upstream.into()));

    Ok(delete.to_sql(dialect)?)
}
