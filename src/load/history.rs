//! SCD2 maintenance of generated `_hist` datasets.
//!
//! Four statements, always in this order:
//!
//! 1. close open versions whose row hash changed in the base
//! 2. close open versions whose natural key left the base (`deleted`)
//! 3. insert a new version for keys with history but no open version (`changed`)
//! 4. insert a first version for keys with no history at all (`new`)
//!
//! Statement 3 runs after 1 and 2, so a key closed in step 1 gets its new
//! version in the same load; statement 4 never sees those keys.

use super::source::null_timestamp;
use super::{row_hash_expr, LoadError, LoadResult};
use crate::metadata::{Catalog, Column, Dataset, SystemRole};
use crate::sql::dml::{Insert, Update};
use crate::sql::expr::{
    and_all, exists, lit_int, lit_null, lit_str, not_exists, placeholder, qualified_col,
    table_col, Expr, ExprExt, ObjectName,
};
use crate::sql::query::{QueryPlan, Select, TableRef};
use crate::sql::surrogate::history_key;
use crate::sql::template::Placeholder;
use crate::sql::{Dialect, SqlError};

const HIST_ALIAS: &str = "h";
const BASE_ALIAS: &str = "b";

/// The four SCD2 statements for `hist`.
pub fn hist_statements(
    catalog: &Catalog,
    hist: &Dataset,
    dialect: Dialect,
) -> LoadResult<Vec<String>> {
    let base_key = hist
        .hist_of
        .as_ref()
        .ok_or_else(|| LoadError::UnsupportedStrategy {
            dataset: hist.key().to_string(),
            strategy: "historize".into(),
        })?;
    let base = catalog.get(base_key)?;
    let keys = &hist.natural_key_fields;
    if keys.is_empty() {
        return Err(LoadError::MissingNaturalKeys(hist.key().to_string()));
    }

    let scd = Scd2 {
        hist,
        base,
        keys,
        target: ObjectName::new(Some(&hist.schema), &hist.name),
    };
    let row_hash = scd.base_row_hash()?;

    let close_changed = Update::table(scd.target.clone())
        .set("version_ended_at", placeholder(Placeholder::LoadTimestamp))
        .filter(scd.outer("version_ended_at").is_null())
        .filter(exists(
            scd.base_matching_outer()?
                .filter(row_hash.clone().ne(scd.outer("row_hash")))
                .into(),
        ));

    let close_deleted = Update::table(scd.target.clone())
        .set("version_ended_at", placeholder(Placeholder::LoadTimestamp))
        .set("version_state", lit_str("deleted"))
        .filter(scd.outer("version_ended_at").is_null())
        .filter(not_exists(scd.base_matching_outer()?.into()));

    let insert_changed = scd.insert_versions(
        "changed",
        &row_hash,
        vec![
            not_exists(
                scd.hist_matching_base()?
                    .filter(table_col(HIST_ALIAS, "version_ended_at").is_null())
                    .into(),
            ),
            exists(scd.hist_matching_base()?.into()),
        ],
    )?;

    let insert_new = scd.insert_versions(
        "new",
        &row_hash,
        vec![not_exists(scd.hist_matching_base()?.into())],
    )?;

    Ok(vec![
        close_changed.to_sql(dialect)?,
        close_deleted.to_sql(dialect)?,
        insert_changed.to_sql(dialect)?,
        insert_new.to_sql(dialect)?,
    ])
}

struct Scd2<'a> {
    hist: &'a Dataset,
    base: &'a Dataset,
    keys: &'a [String],
    target: ObjectName,
}

impl Scd2<'_> {
    /// A column of the history table as referenced from correlated
    /// subqueries of an UPDATE: fully qualified, no alias.
    fn outer(&self, column: &str) -> Expr {
        qualified_col(Some(&self.hist.schema), &self.hist.name, column)
    }

    fn key_join(
        &self,
        left: impl Fn(&str) -> Expr,
        right: impl Fn(&str) -> Expr,
    ) -> LoadResult<Expr> {
        and_all(self.keys.iter().map(|k| left(k.as_str()).eq(right(k.as_str()))))
            .ok_or_else(|| LoadError::MissingNaturalKeys(self.hist.key().to_string()))
    }

    /// `SELECT 1 FROM base AS b WHERE b.<key> = hist.<key>`
    fn base_matching_outer(&self) -> LoadResult<Select> {
        let on = self.key_join(|k| table_col(BASE_ALIAS, k), |k| self.outer(k))?;
        Ok(Select::new()
            .item(lit_int(1))
            .from(TableRef::new(Some(&self.base.schema), &self.base.name).with_alias(BASE_ALIAS))
            .filter(on))
    }

    /// `SELECT 1 FROM hist AS h WHERE h.<key> = b.<key>`
    fn hist_matching_base(&self) -> LoadResult<Select> {
        let on = self.key_join(|k| table_col(HIST_ALIAS, k), |k| table_col(BASE_ALIAS, k))?;
        Ok(Select::new()
            .item(lit_int(1))
            .from(TableRef::new(Some(&self.hist.schema), &self.hist.name).with_alias(HIST_ALIAS))
            .filter(on))
    }

    /// Row hash computed from the base columns, matching how the stored
    /// `row_hash` of each version was computed.
    fn base_row_hash(&self) -> LoadResult<Expr> {
        row_hash_expr(self.base, |c: &Column| Ok(table_col(BASE_ALIAS, &c.name)))
    }

    fn insert_versions(
        &self,
        state: &str,
        row_hash: &Expr,
        predicates: Vec<Expr>,
    ) -> LoadResult<Insert> {
        let mut select = Select::new()
            .from(TableRef::new(Some(&self.base.schema), &self.base.name).with_alias(BASE_ALIAS));
        let mut columns = vec![];
        for column in self.hist.ordered_columns() {
            select = select.item(self.version_value(column, state, row_hash)?);
            columns.push(column.name.clone());
        }
        for predicate in predicates {
            select = select.filter(predicate);
        }
        Ok(Insert::new(self.target.clone(), columns, QueryPlan::Select(select)))
    }

    fn version_value(&self, column: &Column, state: &str, row_hash: &Expr) -> LoadResult<Expr> {
        Ok(match column.system_role {
            Some(SystemRole::SurrogateKey) => {
                history_key(self.keys, Some(BASE_ALIAS)).map_err(SqlError::from)?
            }
            Some(SystemRole::RowHash) => row_hash.clone(),
            Some(SystemRole::VersionStartedAt) | Some(SystemRole::LoadedAt) => {
                placeholder(Placeholder::LoadTimestamp)
            }
            Some(SystemRole::VersionEndedAt) => null_timestamp(),
            Some(SystemRole::VersionState) => lit_str(state),
            Some(SystemRole::LoadRunId) => placeholder(Placeholder::LoadRunId),
            Some(SystemRole::BusinessKey) | Some(SystemRole::ForeignKey) | None => {
                match self.base.column(&column.name) {
                    Some(base_column) => table_col(BASE_ALIAS, &base_column.name),
                    None => lit_null(),
                }
            }
        })
    }
}
