//! Query plan shapes: SELECT, UNION, and their FROM sources.

use super::dialect::{Dialect, SqlDialect};
use super::expr::{Expr, ExprExt};
use super::token::{Token, TokenStream};
use super::{SqlError, SqlResult};

// =============================================================================
// Select Expression (column with optional alias)
// =============================================================================

/// A SELECT list item: expression with optional alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: &str) -> Self {
        Self {
            expr,
            alias: Some(alias.to_string()),
        }
    }

    /// Output column name, when it can be known without a database.
    pub fn output_name(&self) -> Option<&str> {
        match (&self.alias, &self.expr) {
            (Some(alias), _) => Some(alias),
            (None, Expr::Column { name, .. }) => Some(name),
            _ => None,
        }
    }

    fn to_tokens(&self, dialect: Dialect) -> SqlResult<TokenStream> {
        let mut ts = self.expr.to_tokens(dialect)?;
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        Ok(ts)
    }
}

impl From<Expr> for SelectItem {
    fn from(expr: Expr) -> Self {
        SelectItem::new(expr)
    }
}

// =============================================================================
// FROM sources
// =============================================================================

/// A table reference with optional schema and alias.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::QualifiedIdent {
            schema: self.schema.clone(),
            name: self.name.clone(),
        });
        if let Some(alias) = &self.alias {
            push_table_alias(&mut ts, dialect, alias);
        }
        ts
    }
}

/// What a SELECT reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    Table(TableRef),
    Subquery { query: Box<QueryPlan>, alias: String },
}

impl FromSource {
    pub fn subquery(query: QueryPlan, alias: &str) -> Self {
        FromSource::Subquery {
            query: Box::new(query),
            alias: alias.to_string(),
        }
    }

    pub fn to_tokens(&self, dialect: Dialect) -> SqlResult<TokenStream> {
        match self {
            FromSource::Table(table) => Ok(table.to_tokens(dialect)),
            FromSource::Subquery { query, alias } => {
                let mut ts = TokenStream::new();
                ts.lparen()
                    .newline()
                    .append(&query.to_tokens(dialect)?)
                    .newline()
                    .rparen();
                push_table_alias(&mut ts, dialect, alias);
                Ok(ts)
            }
        }
    }
}

impl From<TableRef> for FromSource {
    fn from(table: TableRef) -> Self {
        FromSource::Table(table)
    }
}

/// ` AS alias`, or ` alias` where `AS` is not accepted for tables.
pub(crate) fn push_table_alias(ts: &mut TokenStream, dialect: Dialect, alias: &str) {
    ts.space();
    if dialect.table_alias_keyword() {
        ts.push(Token::As).space();
    }
    ts.push(Token::Ident(alias.to_string()));
}

// =============================================================================
// SELECT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
#[must_use = "builders have no effect until used"]
pub struct Select {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Option<FromSource>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item(mut self, item: impl Into<SelectItem>) -> Self {
        self.items.push(item.into());
        self
    }

    pub fn items(mut self, items: impl IntoIterator<Item = SelectItem>) -> Self {
        self.items.extend(items);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn from(mut self, source: impl Into<FromSource>) -> Self {
        self.from = Some(source.into());
        self
    }

    /// Add a WHERE predicate, AND-ed with any existing one.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn to_tokens(&self, dialect: Dialect) -> SqlResult<TokenStream> {
        if self.items.is_empty() {
            return Err(SqlError::EmptyExpression("select list"));
        }

        let mut ts = TokenStream::new();
        ts.push(Token::Select).space();
        if self.distinct {
            ts.push(Token::Distinct).space();
        }
        let items = self
            .items
            .iter()
            .map(|item| item.to_tokens(dialect))
            .collect::<SqlResult<Vec<_>>>()?;
        ts.comma_separated(items);

        if let Some(from) = &self.from {
            ts.newline()
                .push(Token::From)
                .space()
                .append(&from.to_tokens(dialect)?);
        }

        if let Some(filter) = &self.filter {
            ts.newline()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens(dialect)?);
        }

        if !self.group_by.is_empty() {
            let keys = self
                .group_by
                .iter()
                .map(|e| e.to_tokens(dialect))
                .collect::<SqlResult<Vec<_>>>()?;
            ts.newline().push(Token::GroupBy).space().comma_separated(keys);
        }

        Ok(ts)
    }
}

// =============================================================================
// Query plan
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionMode {
    Distinct,
    All,
}

/// A renderable query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    Select(Select),
    Union { selects: Vec<Select>, mode: UnionMode },
}

impl QueryPlan {
    pub fn to_tokens(&self, dialect: Dialect) -> SqlResult<TokenStream> {
        match self {
            QueryPlan::Select(select) => select.to_tokens(dialect),
            QueryPlan::Union { selects, mode } => {
                if selects.is_empty() {
                    return Err(SqlError::EmptyExpression("union"));
                }
                let mut ts = TokenStream::new();
                for (i, select) in selects.iter().enumerate() {
                    if i > 0 {
                        ts.newline();
                        match mode {
                            UnionMode::All => ts.push(Token::Union).space().push(Token::All),
                            UnionMode::Distinct => {
                                ts.push(Token::Raw(dialect.union_distinct_keyword().into()))
                            }
                        };
                        ts.newline();
                    }
                    ts.append(&select.to_tokens(dialect)?);
                }
                Ok(ts)
            }
        }
    }

    /// Output column names of the first (or only) SELECT.
    pub fn output_names(&self) -> Vec<Option<&str>> {
        let first = match self {
            QueryPlan::Select(select) => Some(select),
            QueryPlan::Union { selects, .. } => selects.first(),
        };
        first
            .map(|s| s.items.iter().map(SelectItem::output_name).collect())
            .unwrap_or_default()
    }
}

impl From<Select> for QueryPlan {
    fn from(select: Select) -> Self {
        QueryPlan::Select(select)
    }
}

/// Render a query plan to SQL text.
pub fn render_select(plan: &QueryPlan, dialect: Dialect) -> SqlResult<String> {
    Ok(plan.to_tokens(dialect)?.serialize(dialect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::expr::{col, lit_int, table_col};

    fn customers() -> Select {
        Select::new()
            .item(table_col("s", "customer_id"))
            .item(SelectItem::aliased(table_col("s", "name"), "customer_name"))
            .from(TableRef::new(Some("stage"), "stg_customer").with_alias("s"))
    }

    #[test]
    fn test_simple_select() {
        let sql = render_select(&customers().into(), Dialect::Postgres).unwrap();
        assert_eq!(
            sql,
            "SELECT \"s\".\"customer_id\", \"s\".\"name\" AS \"customer_name\"\n\
             FROM \"stage\".\"stg_customer\" AS \"s\""
        );
    }

    #[test]
    fn test_oracle_table_alias_has_no_as() {
        let sql = render_select(&customers().into(), Dialect::Oracle).unwrap();
        assert!(sql.contains("FROM \"stage\".\"stg_customer\" \"s\""));
        assert!(sql.contains("AS \"customer_name\""));
    }

    #[test]
    fn test_filters_are_anded() {
        let select = customers()
            .filter(col("a").eq(lit_int(1)))
            .filter(col("b").eq(lit_int(2)));
        let sql = render_select(&select.into(), Dialect::DuckDb).unwrap();
        assert!(sql.ends_with("WHERE \"a\" = 1 AND \"b\" = 2"));
    }

    #[test]
    fn test_subquery_source() {
        let outer = Select::new()
            .item(table_col("src", "customer_id"))
            .from(FromSource::subquery(customers().into(), "src"));
        let sql = render_select(&outer.into(), Dialect::TSql).unwrap();
        assert!(sql.starts_with("SELECT [src].[customer_id]\nFROM (\nSELECT"));
        assert!(sql.ends_with("\n) AS [src]"));
    }

    #[test]
    fn test_union_modes() {
        let plan = QueryPlan::Union {
            selects: vec![customers(), customers()],
            mode: UnionMode::Distinct,
        };
        assert!(render_select(&plan, Dialect::DuckDb)
            .unwrap()
            .contains("\nUNION\n"));
        assert!(render_select(&plan, Dialect::BigQuery)
            .unwrap()
            .contains("\nUNION DISTINCT\n"));

        let all = QueryPlan::Union {
            selects: vec![customers(), customers()],
            mode: UnionMode::All,
        };
        assert!(render_select(&all, Dialect::Snowflake)
            .unwrap()
            .contains("\nUNION ALL\n"));
    }

    #[test]
    fn test_empty_select_list_is_error() {
        let err = render_select(&Select::new().into(), Dialect::DuckDb).unwrap_err();
        assert_eq!(err, SqlError::EmptyExpression("select list"));
    }

    #[test]
    fn test_output_names() {
        let plan: QueryPlan = customers().into();
        assert_eq!(
            plan.output_names(),
            vec![Some("customer_id"), Some("customer_name")]
        );
    }
}
