//! Data Definition Language (DDL) rendering.
//!
//! Only additive and rename operations exist here. Nothing in the crate
//! renders DROP TABLE or DROP COLUMN.

use super::dialect::{Dialect, SqlDialect};
use super::dialect::helpers::{self, qualified};
use super::query::QueryPlan;
use super::token::{Token, TokenStream};
use super::types::DataType;
use super::{SqlError, SqlResult};

/// Column definition used by CREATE TABLE and ADD COLUMN.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnSpec {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    fn to_tokens(&self, dialect: Dialect, with_nullability: bool) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Ident(self.name.clone()))
            .space()
            .push(Token::Raw(dialect.emit_data_type(&self.data_type)));
        if with_nullability && !self.nullable {
            ts.space().push(Token::Not).space().push(Token::Null);
        }
        ts
    }
}

fn unsupported(dialect: Dialect, construct: &str) -> SqlError {
    SqlError::UnsupportedConstruct {
        dialect,
        construct: construct.to_string(),
    }
}

/// `CREATE SCHEMA IF NOT EXISTS` or the dialect's guarded equivalent.
pub fn create_schema(dialect: Dialect, schema: &str) -> SqlResult<String> {
    dialect
        .emit_create_schema(schema)
        .map(|ts| ts.serialize(dialect))
        .ok_or_else(|| unsupported(dialect, "CREATE SCHEMA"))
}

/// CREATE TABLE that is a no-op when the table already exists.
///
/// Oracle has neither `IF NOT EXISTS` nor a guard; the plain statement is
/// rendered and callers check existence first.
pub fn create_table(
    dialect: Dialect,
    schema: Option<&str>,
    table: &str,
    columns: &[ColumnSpec],
) -> SqlResult<String> {
    if columns.is_empty() {
        return Err(SqlError::EmptyExpression("column list"));
    }

    let mut ts = TokenStream::new();
    if !dialect.supports_if_not_exists() {
        if let Some(guard) = dialect.emit_missing_table_guard(schema, table) {
            ts.append(&guard);
        }
    }
    ts.push(Token::Create).space().push(Token::Table).space();
    if dialect.supports_if_not_exists() {
        ts.push(Token::If)
            .space()
            .push(Token::Not)
            .space()
            .push(Token::Exists)
            .space();
    }
    ts.push(qualified(schema, table)).space().lparen().newline();
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            ts.comma().newline();
        }
        ts.indent(1).append(&column.to_tokens(dialect, true));
    }
    ts.newline().rparen();
    Ok(ts.serialize(dialect))
}

/// `ALTER TABLE ... ADD [COLUMN] name type`.
///
/// Added columns are always nullable: existing rows have no value for them.
pub fn add_column(
    dialect: Dialect,
    schema: Option<&str>,
    table: &str,
    column: &ColumnSpec,
) -> SqlResult<String> {
    let mut ts = helpers::alter_table(schema, table);
    ts.push(Token::Add).space();
    if dialect.add_column_keyword() {
        ts.push(Token::Column).space();
    }
    ts.append(&column.to_tokens(dialect, false));
    Ok(ts.serialize(dialect))
}

pub fn rename_column(
    dialect: Dialect,
    schema: Option<&str>,
    table: &str,
    from: &str,
    to: &str,
) -> SqlResult<String> {
    Ok(dialect
        .emit_rename_column(schema, table, from, to)
        .serialize(dialect))
}

pub fn rename_table(
    dialect: Dialect,
    schema: Option<&str>,
    from: &str,
    to: &str,
) -> SqlResult<String> {
    Ok(dialect.emit_rename_table(schema, from, to).serialize(dialect))
}

/// In-place column type change; fails where the vendor has none.
pub fn alter_column_type(
    dialect: Dialect,
    schema: Option<&str>,
    table: &str,
    column: &str,
    data_type: &DataType,
) -> SqlResult<String> {
    if !dialect.supports_alter_column_type() {
        return Err(unsupported(dialect, "ALTER COLUMN TYPE"));
    }
    dialect
        .emit_alter_column_type(schema, table, column, data_type)
        .map(|ts| ts.serialize(dialect))
        .ok_or_else(|| unsupported(dialect, "ALTER COLUMN TYPE"))
}

pub fn create_view(
    dialect: Dialect,
    schema: Option<&str>,
    name: &str,
    query: &QueryPlan,
) -> SqlResult<String> {
    let mut ts = TokenStream::new();
    ts.push(Token::Raw(dialect.create_view_keyword().into()))
        .space()
        .push(qualified(schema, name))
        .space()
        .push(Token::As)
        .newline()
        .append(&query.to_tokens(dialect)?);
    Ok(ts.serialize(dialect))
}

pub fn truncate(dialect: Dialect, schema: Option<&str>, table: &str) -> SqlResult<String> {
    let mut ts = TokenStream::new();
    ts.push(Token::Truncate)
        .space()
        .push(Token::Table)
        .space()
        .push(qualified(schema, table));
    Ok(ts.serialize(dialect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::expr::col;
    use crate::sql::query::{Select, TableRef};
    use crate::sql::test_utils::validate_sql;

    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("customer_id", DataType::Int64).not_null(),
            ColumnSpec::new("name", DataType::Varchar(200)),
        ]
    }

    #[test]
    fn test_create_table_if_not_exists() {
        let sql = create_table(Dialect::Postgres, Some("rawcore"), "rc_customer", &columns()).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"rawcore\".\"rc_customer\" (\n    \
             \"customer_id\" BIGINT NOT NULL,\n    \
             \"name\" VARCHAR(200)\n)"
        );
        validate_sql(&sql, Dialect::Postgres).unwrap();
    }

    #[test]
    fn test_create_table_tsql_guard() {
        let sql = create_table(Dialect::TSql, Some("rawcore"), "rc_customer", &columns()).unwrap();
        assert!(sql.starts_with(
            "IF OBJECT_ID(N'[rawcore].[rc_customer]', N'U') IS NULL CREATE TABLE [rawcore].[rc_customer] ("
        ));
        assert!(sql.contains("[name] NVARCHAR(200)"));
    }

    #[test]
    fn test_create_table_oracle_plain() {
        let sql = create_table(Dialect::Oracle, Some("RAWCORE"), "RC_CUSTOMER", &columns()).unwrap();
        assert!(sql.starts_with("CREATE TABLE \"RAWCORE\".\"RC_CUSTOMER\" ("));
        assert!(!sql.contains("IF NOT EXISTS"));
    }

    #[test]
    fn test_create_table_requires_columns() {
        assert_eq!(
            create_table(Dialect::DuckDb, None, "t", &[]),
            Err(SqlError::EmptyExpression("column list"))
        );
    }

    #[test]
    fn test_add_column_keyword() {
        let column = ColumnSpec::new("email", DataType::String).not_null();
        assert_eq!(
            add_column(Dialect::Postgres, Some("s"), "t", &column).unwrap(),
            "ALTER TABLE \"s\".\"t\" ADD COLUMN \"email\" TEXT"
        );
        assert_eq!(
            add_column(Dialect::TSql, Some("s"), "t", &column).unwrap(),
            "ALTER TABLE [s].[t] ADD [email] NVARCHAR(MAX)"
        );
    }

    #[test]
    fn test_create_schema_oracle_unsupported() {
        assert!(create_schema(Dialect::DuckDb, "stage").is_ok());
        assert!(matches!(
            create_schema(Dialect::Oracle, "stage"),
            Err(SqlError::UnsupportedConstruct { .. })
        ));
    }

    #[test]
    fn test_rename_forms() {
        assert_eq!(
            rename_column(Dialect::DuckDb, Some("s"), "t", "old_col", "new_col").unwrap(),
            "ALTER TABLE \"s\".\"t\" RENAME COLUMN \"old_col\" TO \"new_col\""
        );
        assert_eq!(
            rename_table(Dialect::Snowflake, Some("s"), "a", "b").unwrap(),
            "ALTER TABLE \"s\".\"a\" RENAME TO \"s\".\"b\""
        );
        assert_eq!(
            rename_table(Dialect::Postgres, Some("s"), "a", "b").unwrap(),
            "ALTER TABLE \"s\".\"a\" RENAME TO \"b\""
        );
    }

    #[test]
    fn test_alter_column_type_gated() {
        assert_eq!(
            alter_column_type(Dialect::Postgres, Some("s"), "t", "c", &DataType::Int64).unwrap(),
            "ALTER TABLE \"s\".\"t\" ALTER COLUMN \"c\" TYPE BIGINT"
        );
        assert!(alter_column_type(Dialect::BigQuery, Some("s"), "t", "c", &DataType::Int64).is_err());
    }

    #[test]
    fn test_create_view_and_truncate() {
        let query = Select::new()
            .item(col("id"))
            .from(TableRef::new(Some("s"), "t"))
            .into();
        assert_eq!(
            create_view(Dialect::TSql, Some("serving"), "v", &query).unwrap(),
            "CREATE OR ALTER VIEW [serving].[v] AS\nSELECT [id]\nFROM [s].[t]"
        );
        assert_eq!(
            truncate(Dialect::MySql, Some("s"), "t").unwrap(),
            "TRUNCATE TABLE `s`.`t`"
        );
    }
}
