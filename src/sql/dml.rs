//! DML (Data Manipulation Language) support.
//!
//! INSERT ... SELECT, UPDATE, DELETE and MERGE. Loads never insert literal
//! rows, so INSERT always takes a query source.
//!
//! # Examples
//!
//! ```ignore
//! use strata::sql::dml::{MergeStatement, MergeOptions};
//! use strata::sql::Dialect;
//!
//! let merge = MergeStatement::new(target, source)
//!     .keys(["customer_id"])
//!     .update(["name", "email"])
//!     .insert(["customer_id", "name", "email"]);
//!
//! // One MERGE on Postgres, BEGIN/UPDATE/INSERT/COMMIT on DuckDB.
//! let statements = merge.render(Dialect::DuckDb)?;
//! ```

use super::dialect::{Dialect, SqlDialect, UpdateFromStyle};
use super::expr::{and_all, lit_int, qualified_col, table_col, Expr, ExprExt, ObjectName};
use super::query::{push_table_alias, FromSource, QueryPlan, Select, SelectItem, TableRef};
use super::token::{Token, TokenStream};
use super::{SqlError, SqlResult};

const TARGET_ALIAS: &str = "tgt";
const SOURCE_ALIAS: &str = "src";

fn target_token(target: &ObjectName) -> Token {
    target.to_token()
}

fn display_name(target: &ObjectName) -> String {
    match &target.schema {
        Some(s) => format!("{}.{}", s, target.name),
        None => target.name.clone(),
    }
}

// ============================================================================
// INSERT
// ============================================================================

/// `INSERT INTO target (columns) <query>`.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Insert {
    pub target: ObjectName,
    pub columns: Vec<String>,
    pub source: QueryPlan,
}

impl Insert {
    pub fn new(target: ObjectName, columns: Vec<String>, source: QueryPlan) -> Self {
        Self {
            target,
            columns,
            source,
        }
    }

    pub fn to_tokens(&self, dialect: Dialect) -> SqlResult<TokenStream> {
        if self.columns.is_empty() {
            return Err(SqlError::EmptyExpression("insert column list"));
        }
        let mut ts = TokenStream::new();
        ts.push(Token::Insert)
            .space()
            .push(Token::Into)
            .space()
            .push(target_token(&self.target))
            .space()
            .lparen()
            .comma_separated(self.columns.iter().map(|c| TokenStream::from(Token::Ident(c.clone()))))
            .rparen()
            .newline()
            .append(&self.source.to_tokens(dialect)?);
        Ok(ts)
    }

    pub fn to_sql(&self, dialect: Dialect) -> SqlResult<String> {
        Ok(self.to_tokens(dialect)?.serialize(dialect))
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// Single-table UPDATE. Correlated predicates reference the target by its
/// qualified name since not every vendor accepts an alias here.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Update {
    pub target: ObjectName,
    pub assignments: Vec<(String, Expr)>,
    pub filter: Option<Expr>,
}

impl Update {
    pub fn table(target: ObjectName) -> Self {
        Self {
            target,
            assignments: vec![],
            filter: None,
        }
    }

    pub fn set(mut self, column: &str, value: Expr) -> Self {
        self.assignments.push((column.to_string(), value));
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn to_tokens(&self, dialect: Dialect) -> SqlResult<TokenStream> {
        if self.assignments.is_empty() {
            return Err(SqlError::EmptyExpression("update assignments"));
        }
        let mut ts = TokenStream::new();
        ts.push(Token::Update)
            .space()
            .push(target_token(&self.target))
            .newline()
            .push(Token::Set)
            .space()
            .comma_separated(assignments(&self.assignments, dialect)?);
        if let Some(filter) = &self.filter {
            ts.newline()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens(dialect)?);
        }
        Ok(ts)
    }

    pub fn to_sql(&self, dialect: Dialect) -> SqlResult<String> {
        Ok(self.to_tokens(dialect)?.serialize(dialect))
    }
}

fn assignments(pairs: &[(String, Expr)], dialect: Dialect) -> SqlResult<Vec<TokenStream>> {
    pairs
        .iter()
        .map(|(column, value)| {
            let mut ts = TokenStream::new();
            ts.push(Token::Ident(column.clone()))
                .space()
                .push(Token::Eq)
                .space()
                .append(&value.to_tokens(dialect)?);
            Ok(ts)
        })
        .collect()
}

// ============================================================================
// DELETE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Delete {
    pub target: ObjectName,
    pub filter: Option<Expr>,
}

impl Delete {
    pub fn from(target: ObjectName) -> Self {
        Self {
            target,
            filter: None,
        }
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn to_tokens(&self, dialect: Dialect) -> SqlResult<TokenStream> {
        let mut ts = TokenStream::new();
        ts.push(Token::Delete)
            .space()
            .push(Token::From)
            .space()
            .push(target_token(&self.target));
        if let Some(filter) = &self.filter {
            ts.newline()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens(dialect)?);
        }
        Ok(ts)
    }

    pub fn to_sql(&self, dialect: Dialect) -> SqlResult<String> {
        Ok(self.to_tokens(dialect)?.serialize(dialect))
    }
}

// ============================================================================
// MERGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Wrap the UPDATE + INSERT fallback in the dialect's transaction
    /// statements so concurrent readers never see a half-applied merge.
    pub transactional: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            transactional: true,
        }
    }
}

/// Upsert of `source` into `target` keyed on `key_columns`.
///
/// The same contract renders as a native MERGE where the dialect has one
/// and as `UPDATE ...; INSERT ... WHERE NOT EXISTS (...)` elsewhere, so
/// callers never branch on the dialect.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "DML statements have no effect until rendered"]
pub struct MergeStatement {
    pub target: ObjectName,
    pub source: QueryPlan,
    pub key_columns: Vec<String>,
    pub update_columns: Vec<String>,
    pub insert_columns: Vec<String>,
    pub options: MergeOptions,
}

impl MergeStatement {
    pub fn new(target: ObjectName, source: QueryPlan) -> Self {
        Self {
            target,
            source,
            key_columns: vec![],
            update_columns: vec![],
            insert_columns: vec![],
            options: MergeOptions::default(),
        }
    }

    pub fn keys<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn update<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn insert<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn options(mut self, options: MergeOptions) -> Self {
        self.options = options;
        self
    }

    /// Render to one or more statements, in execution order.
    pub fn render(&self, dialect: Dialect) -> SqlResult<Vec<String>> {
        if self.key_columns.is_empty() {
            return Err(SqlError::EmptyMerge(display_name(&self.target)));
        }
        if self.insert_columns.is_empty() {
            return Err(SqlError::EmptyExpression("merge insert columns"));
        }

        if dialect.supports_merge() {
            return Ok(vec![self.native(dialect)?]);
        }

        let mut statements = vec![];
        if !self.updatable_columns().is_empty() {
            statements.push(self.fallback_update(dialect)?);
        }
        statements.push(self.fallback_insert(dialect)?);

        match dialect.transaction_statements() {
            Some((begin, commit)) if self.options.transactional => {
                statements.insert(0, begin.to_string());
                statements.push(commit.to_string());
            }
            _ => {}
        }
        Ok(statements)
    }

    /// Update columns minus the keys; some vendors reject updating ON columns.
    fn updatable_columns(&self) -> Vec<&String> {
        self.update_columns
            .iter()
            .filter(|c| !self.key_columns.contains(c))
            .collect()
    }

    fn key_predicate(&self, target: impl Fn(&str) -> Expr) -> SqlResult<Expr> {
        and_all(
            self.key_columns
                .iter()
                .map(|k| target(k).eq(table_col(SOURCE_ALIAS, k))),
        )
        .ok_or_else(|| SqlError::EmptyMerge(display_name(&self.target)))
    }

    fn source_from(&self) -> FromSource {
        FromSource::subquery(self.source.clone(), SOURCE_ALIAS)
    }

    fn native(&self, dialect: Dialect) -> SqlResult<String> {
        let on = self.key_predicate(|k| table_col(TARGET_ALIAS, k))?;

        let mut ts = TokenStream::new();
        ts.push(Token::Merge)
            .space()
            .push(Token::Into)
            .space()
            .push(target_token(&self.target));
        push_table_alias(&mut ts, dialect, TARGET_ALIAS);
        ts.newline()
            .push(Token::Using)
            .space()
            .append(&self.source_from().to_tokens(dialect)?)
            .newline()
            .push(Token::On)
            .space()
            .lparen()
            .append(&on.to_tokens(dialect)?)
            .rparen();

        let updates: Vec<(String, Expr)> = self
            .updatable_columns()
            .into_iter()
            .map(|c| (c.clone(), table_col(SOURCE_ALIAS, c)))
            .collect();
        if !updates.is_empty() {
            ts.newline()
                .push(Token::When)
                .space()
                .push(Token::Matched)
                .space()
                .push(Token::Then)
                .space()
                .push(Token::Update)
                .space()
                .push(Token::Set)
                .space()
                .comma_separated(assignments(&updates, dialect)?);
        }

        let values = self
            .insert_columns
            .iter()
            .map(|c| table_col(SOURCE_ALIAS, c).to_tokens(dialect))
            .collect::<SqlResult<Vec<_>>>()?;
        ts.newline()
            .push(Token::When)
            .space()
            .push(Token::Not)
            .space()
            .push(Token::Matched)
            .space()
            .push(Token::Then)
            .space()
            .push(Token::Insert)
            .space()
            .lparen()
            .comma_separated(
                self.insert_columns
                    .iter()
                    .map(|c| TokenStream::from(Token::Ident(c.clone()))),
            )
            .rparen()
            .space()
            .push(Token::Values)
            .space()
            .lparen()
            .comma_separated(values)
            .rparen();

        if dialect.merge_requires_terminator() {
            ts.push(Token::Semicolon);
        }
        Ok(ts.serialize(dialect))
    }

    fn fallback_update(&self, dialect: Dialect) -> SqlResult<String> {
        let columns = self.updatable_columns();
        let mut ts = TokenStream::new();

        match dialect.update_from_style() {
            UpdateFromStyle::FromClause => {
                let target = &self.target;
                let on = self.key_predicate(|k| {
                    qualified_col(target.schema.as_deref(), &target.name, k)
                })?;
                let sets: Vec<(String, Expr)> = columns
                    .iter()
                    .map(|c| (c.to_string(), table_col(SOURCE_ALIAS, c)))
                    .collect();
                ts.push(Token::Update)
                    .space()
                    .push(target_token(target))
                    .newline()
                    .push(Token::Set)
                    .space()
                    .comma_separated(assignments(&sets, dialect)?)
                    .newline()
                    .push(Token::From)
                    .space()
                    .append(&self.source_from().to_tokens(dialect)?)
                    .newline()
                    .push(Token::Where)
                    .space()
                    .append(&on.to_tokens(dialect)?);
            }
            UpdateFromStyle::JoinClause => {
                let on = self.key_predicate(|k| table_col(TARGET_ALIAS, k))?;
                let sets = columns
                    .iter()
                    .map(|c| {
                        let mut a = table_col(TARGET_ALIAS, c).to_tokens(dialect)?;
                        a.space()
                            .push(Token::Eq)
                            .space()
                            .append(&table_col(SOURCE_ALIAS, c).to_tokens(dialect)?);
                        Ok(a)
                    })
                    .collect::<SqlResult<Vec<_>>>()?;
                ts.push(Token::Update)
                    .space()
                    .push(target_token(&self.target));
                push_table_alias(&mut ts, dialect, TARGET_ALIAS);
                ts.newline()
                    .push(Token::Inner)
                    .space()
                    .push(Token::Join)
                    .space()
                    .append(&self.source_from().to_tokens(dialect)?)
                    .space()
                    .push(Token::On)
                    .space()
                    .append(&on.to_tokens(dialect)?)
                    .newline()
                    .push(Token::Set)
                    .space()
                    .comma_separated(sets);
            }
            UpdateFromStyle::TSqlFrom => {
                let on = self.key_predicate(|k| table_col(TARGET_ALIAS, k))?;
                let sets: Vec<(String, Expr)> = columns
                    .iter()
                    .map(|c| (c.to_string(), table_col(SOURCE_ALIAS, c)))
                    .collect();
                let target = TableRef::new(self.target.schema.as_deref(), &self.target.name)
                    .with_alias(TARGET_ALIAS);
                ts.push(Token::Update)
                    .space()
                    .push(Token::Ident(TARGET_ALIAS.into()))
                    .newline()
                    .push(Token::Set)
                    .space()
                    .comma_separated(assignments(&sets, dialect)?)
                    .newline()
                    .push(Token::From)
                    .space()
                    .append(&target.to_tokens(dialect))
                    .newline()
                    .push(Token::Inner)
                    .space()
                    .push(Token::Join)
                    .space()
                    .append(&self.source_from().to_tokens(dialect)?)
                    .space()
                    .push(Token::On)
                    .space()
                    .append(&on.to_tokens(dialect)?);
            }
            UpdateFromStyle::Unsupported => {
                return Err(SqlError::UnsupportedConstruct {
                    dialect,
                    construct: "UPDATE from a joined source".into(),
                })
            }
        }

        Ok(ts.serialize(dialect))
    }

    fn fallback_insert(&self, dialect: Dialect) -> SqlResult<String> {
        let matched = Select::new()
            .item(lit_int(1))
            .from(
                TableRef::new(self.target.schema.as_deref(), &self.target.name)
                    .with_alias(TARGET_ALIAS),
            )
            .filter(self.key_predicate(|k| table_col(TARGET_ALIAS, k))?);

        let select = Select::new()
            .items(
                self.insert_columns
                    .iter()
                    .map(|c| SelectItem::new(table_col(SOURCE_ALIAS, c))),
            )
            .from(self.source_from())
            .filter(super::expr::not_exists(matched.into()));

        Insert::new(
            self.target.clone(),
            self.insert_columns.clone(),
            select.into(),
        )
        .to_sql(dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::expr::{col, placeholder};
    use crate::sql::template::Placeholder;

    fn target() -> ObjectName {
        ObjectName::new(Some("rawcore"), "rc_customer")
    }

    fn source() -> QueryPlan {
        Select::new()
            .item(col("customer_id"))
            .item(col("name"))
            .from(TableRef::new(Some("stage"), "stg_customer"))
            .into()
    }

    fn merge() -> MergeStatement {
        MergeStatement::new(target(), source())
            .keys(["customer_id"])
            .update(["customer_id", "name"])
            .insert(["customer_id", "name"])
    }

    #[test]
    fn test_insert_select() {
        let insert = Insert::new(target(), vec!["customer_id".into()], source());
        let sql = insert.to_sql(Dialect::Postgres).unwrap();
        assert!(sql.starts_with("INSERT INTO \"rawcore\".\"rc_customer\" (\"customer_id\")\nSELECT"));
    }

    #[test]
    fn test_update_and_delete() {
        let update = Update::table(target())
            .set("version_ended_at", placeholder(Placeholder::LoadTimestamp))
            .filter(col("version_ended_at").is_null());
        assert_eq!(
            update.to_sql(Dialect::DuckDb).unwrap(),
            "UPDATE \"rawcore\".\"rc_customer\"\nSET \"version_ended_at\" = {{ load_timestamp }}\nWHERE \"version_ended_at\" IS NULL"
        );

        let delete = Delete::from(target()).filter(col("gone").eq(lit_int(1)));
        assert_eq!(
            delete.to_sql(Dialect::TSql).unwrap(),
            "DELETE FROM [rawcore].[rc_customer]\nWHERE [gone] = 1"
        );
    }

    #[test]
    fn test_native_merge_postgres() {
        let statements = merge().render(Dialect::Postgres).unwrap();
        assert_eq!(statements.len(), 1);
        let sql = &statements[0];
        assert!(sql.starts_with("MERGE INTO \"rawcore\".\"rc_customer\" AS \"tgt\"\nUSING ("));
        assert!(sql.contains("ON (\"tgt\".\"customer_id\" = \"src\".\"customer_id\")"));
        assert!(sql.contains("WHEN MATCHED THEN UPDATE SET \"name\" = \"src\".\"name\""));
        // keys are never updated
        assert!(!sql.contains("SET \"customer_id\""));
        assert!(sql.contains(
            "WHEN NOT MATCHED THEN INSERT (\"customer_id\", \"name\") VALUES (\"src\".\"customer_id\", \"src\".\"name\")"
        ));
    }

    #[test]
    fn test_tsql_merge_terminated() {
        let statements = merge().render(Dialect::TSql).unwrap();
        assert!(statements[0].ends_with(';'));
    }

    #[test]
    fn test_oracle_merge_aliases_without_as() {
        let sql = &merge().render(Dialect::Oracle).unwrap()[0];
        assert!(sql.starts_with("MERGE INTO \"rawcore\".\"rc_customer\" \"tgt\""));
        assert!(sql.contains(") \"src\"\nON ("));
    }

    #[test]
    fn test_fallback_duckdb_wrapped_in_transaction() {
        let statements = merge().render(Dialect::DuckDb).unwrap();
        assert_eq!(statements.len(), 4);
        assert_eq!(statements[0], "BEGIN TRANSACTION");
        assert!(statements[1].starts_with("UPDATE \"rawcore\".\"rc_customer\"\nSET \"name\" = \"src\".\"name\"\nFROM ("));
        assert!(statements[1].ends_with(
            "WHERE \"rawcore\".\"rc_customer\".\"customer_id\" = \"src\".\"customer_id\""
        ));
        assert!(statements[2].contains("WHERE NOT EXISTS (SELECT 1\nFROM \"rawcore\".\"rc_customer\" AS \"tgt\""));
        assert_eq!(statements[3], "COMMIT");
    }

    #[test]
    fn test_fallback_without_transaction() {
        let statements = merge()
            .options(MergeOptions {
                transactional: false,
            })
            .render(Dialect::Redshift)
            .unwrap();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("UPDATE"));
        assert!(statements[1].starts_with("INSERT INTO"));
    }

    #[test]
    fn test_fallback_mysql_join_update() {
        let statements = merge().render(Dialect::MySql).unwrap();
        assert_eq!(statements[0], "START TRANSACTION");
        assert!(statements[1].starts_with("UPDATE `rawcore`.`rc_customer` AS `tgt`\nINNER JOIN ("));
        assert!(statements[1].ends_with("SET `tgt`.`name` = `src`.`name`"));
    }

    #[test]
    fn test_fallback_fabric_tsql_from() {
        let statements = merge().render(Dialect::Fabric).unwrap();
        let update = &statements[1];
        assert!(update.starts_with("UPDATE [tgt]\nSET [name] = [src].[name]\nFROM [rawcore].[rc_customer] AS [tgt]\nINNER JOIN ("));
        assert!(update.ends_with("ON [tgt].[customer_id] = [src].[customer_id]"));
    }

    #[test]
    fn test_insert_only_merge_skips_update() {
        let statements = MergeStatement::new(target(), source())
            .keys(["customer_id"])
            .insert(["customer_id", "name"])
            .render(Dialect::DuckDb)
            .unwrap();
        assert_eq!(statements.len(), 3);
        assert!(statements[1].starts_with("INSERT INTO"));
    }

    #[test]
    fn test_merge_without_keys_is_error() {
        let err = MergeStatement::new(target(), source())
            .insert(["name"])
            .render(Dialect::Postgres)
            .unwrap_err();
        assert_eq!(err, SqlError::EmptyMerge("rawcore.rc_customer".into()));
    }
}
