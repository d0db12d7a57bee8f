//! SQL dialects.
//!
//! Each supported warehouse implements [`SqlDialect`]; the [`Dialect`] enum
//! selects one at runtime and delegates to it. Differences covered here:
//!
//! - Identifier quoting: `"` (ANSI/Postgres/Snowflake/Oracle), `` ` `` (MySQL/BigQuery/Databricks), `[]` (T-SQL/Fabric)
//! - Boolean literals: TRUE/FALSE vs 1/0
//! - Date and timestamp literal casts
//! - String concatenation: `||` vs `+` vs `CONCAT()`
//! - SHA-256 hashing for surrogate keys and row hashes
//! - DDL spelling: schema creation, renames, column type changes
//! - UPDATE with a joined source, used by the MERGE fallback
//!
//! # Capabilities
//!
//! | Dialect | MERGE | delete detection | ALTER COLUMN TYPE |
//! |---------|-------|------------------|-------------------|
//! | duckdb | fallback | ✓ | ✓ |
//! | postgres | ✓ (15+) | ✓ | ✓ |
//! | tsql | ✓ | ✓ | ✓ |
//! | fabric | fallback | ✓ | ❌ |
//! | mysql | fallback | ✓ | ✓ |
//! | snowflake | ✓ | ✓ | ✓ |
//! | bigquery | ✓ | ✓ | ❌ |
//! | redshift | fallback | ✓ | ✓ |
//! | databricks | ✓ | ✓ | ❌ |
//! | oracle | ✓ | ✓ | ✓ |
//!
//! Callers branch on `supports_merge()`, `supports_delete_detection()` and
//! `supports_alter_column_type()` instead of matching on the dialect.

mod bigquery;
mod databricks;
mod duckdb;
mod fabric;
pub mod helpers;
mod mysql;
mod oracle;
mod postgres;
mod redshift;
mod snowflake;
mod tsql;

pub use bigquery::BigQuery;
pub use databricks::Databricks;
pub use duckdb::DuckDb;
pub use fabric::Fabric;
pub use mysql::MySql;
pub use oracle::Oracle;
pub use postgres::Postgres;
pub use redshift::Redshift;
pub use snowflake::Snowflake;
pub use tsql::TSql;

use super::token::TokenStream;
use super::types::DataType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How an UPDATE reads from a joined source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateFromStyle {
    /// `UPDATE t SET c = s.c FROM (src) AS s WHERE t.k = s.k`
    FromClause,
    /// `UPDATE t INNER JOIN (src) AS s ON t.k = s.k SET t.c = s.c`
    JoinClause,
    /// `UPDATE t SET c = s.c FROM t INNER JOIN (src) AS s ON t.k = s.k`
    TSqlFrom,
    /// No multi-table UPDATE.
    Unsupported,
}

/// SQL dialect trait - how each construct is spelled for one vendor.
///
/// Defaults follow ANSI / Postgres where a sensible default exists.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display and configuration.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifiers and Literals
    // =========================================================================

    /// Quote an identifier. Must be idempotent: quoting an already
    /// quoted identifier returns it unchanged.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    fn format_bool(&self, b: bool) -> &'static str;

    fn format_null(&self) -> &'static str {
        "NULL"
    }

    /// Literal for an ISO `YYYY-MM-DD` date.
    fn format_date_literal(&self, date: &str) -> String {
        format!(
            "CAST({} AS {})",
            self.quote_string(date),
            self.cast_target(&DataType::Date)
        )
    }

    /// Literal for an ISO `YYYY-MM-DD HH:MM:SS[.f]` timestamp.
    fn format_timestamp_literal(&self, ts: &str) -> String {
        format!(
            "CAST({} AS {})",
            self.quote_string(ts),
            self.cast_target(&DataType::Timestamp)
        )
    }

    // =========================================================================
    // Operators and Functions
    // =========================================================================

    fn concat_operator(&self) -> &'static str {
        "||"
    }

    /// When false, concatenation renders as `CONCAT(a, b, ...)`.
    fn supports_concat_operator(&self) -> bool {
        true
    }

    /// Remap a function name (matched case-insensitively).
    fn remap_function(&self, name: &str) -> Option<&'static str> {
        let _ = name;
        None
    }

    /// Lower-case hex SHA-256 of a string expression.
    fn emit_hash256(&self, input: TokenStream) -> TokenStream;

    // =========================================================================
    // Types
    // =========================================================================

    /// Column type as written in DDL.
    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_postgres(dt)
    }

    /// Type as written inside `CAST(x AS ...)`.
    fn cast_target(&self, dt: &DataType) -> String {
        self.emit_data_type(dt)
    }

    // =========================================================================
    // DDL
    // =========================================================================

    fn supports_if_not_exists(&self) -> bool {
        true
    }

    /// Statement prefix that skips CREATE TABLE when the table exists, for
    /// dialects without `IF NOT EXISTS`.
    fn emit_missing_table_guard(&self, schema: Option<&str>, name: &str) -> Option<TokenStream> {
        let _ = (schema, name);
        None
    }

    /// `CREATE SCHEMA IF NOT EXISTS` or equivalent. `None` when schemas
    /// cannot be created through DDL.
    fn emit_create_schema(&self, schema: &str) -> Option<TokenStream> {
        use super::token::Token;
        let mut ts = TokenStream::new();
        ts.push(Token::Create)
            .space()
            .push(Token::Schema)
            .space()
            .push(Token::If)
            .space()
            .push(Token::Not)
            .space()
            .push(Token::Exists)
            .space()
            .push(Token::Ident(schema.into()));
        Some(ts)
    }

    /// Whether `ADD` is followed by the `COLUMN` keyword.
    fn add_column_keyword(&self) -> bool {
        true
    }

    fn emit_rename_table(&self, schema: Option<&str>, from: &str, to: &str) -> TokenStream {
        helpers::emit_rename_table_standard(schema, from, to, false)
    }

    fn emit_rename_column(
        &self,
        schema: Option<&str>,
        table: &str,
        from: &str,
        to: &str,
    ) -> TokenStream {
        use super::token::Token;
        let mut ts = helpers::alter_table(schema, table);
        ts.push(Token::Rename)
            .space()
            .push(Token::Column)
            .space()
            .push(Token::Ident(from.into()))
            .space()
            .push(Token::To)
            .space()
            .push(Token::Ident(to.into()));
        ts
    }

    /// `None` when the vendor cannot change a column type in place.
    fn emit_alter_column_type(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        dt: &DataType,
    ) -> Option<TokenStream> {
        use super::token::Token;
        let mut ts = helpers::alter_table(schema, table);
        ts.push(Token::Alter)
            .space()
            .push(Token::Column)
            .space()
            .push(Token::Ident(column.into()))
            .space()
            .push(Token::Raw(format!("TYPE {}", self.emit_data_type(dt))));
        Some(ts)
    }

    /// Leading keywords of a view statement that replaces any existing view.
    fn create_view_keyword(&self) -> &'static str {
        "CREATE OR REPLACE VIEW"
    }

    /// Whether table and subquery aliases are introduced with `AS`.
    fn table_alias_keyword(&self) -> bool {
        true
    }

    /// Whether `ROW_NUMBER() OVER (...)` must carry an ORDER BY.
    fn row_number_requires_order_by(&self) -> bool {
        false
    }

    /// Set operator for a de-duplicating union.
    fn union_distinct_keyword(&self) -> &'static str {
        "UNION"
    }

    // =========================================================================
    // DML and Transactions
    // =========================================================================

    fn update_from_style(&self) -> UpdateFromStyle {
        UpdateFromStyle::FromClause
    }

    /// Whether a MERGE statement must end with `;`.
    fn merge_requires_terminator(&self) -> bool {
        false
    }

    /// `(begin, commit)` statements, or `None` without explicit transactions.
    fn transaction_statements(&self) -> Option<(&'static str, &'static str)> {
        Some(("BEGIN TRANSACTION", "COMMIT"))
    }

    // =========================================================================
    // Capabilities
    // =========================================================================

    /// Native `MERGE INTO`. Without it, merges render as UPDATE + INSERT.
    fn supports_merge(&self) -> bool {
        false
    }

    /// `DELETE ... WHERE NOT EXISTS (...)` against a staging snapshot.
    fn supports_delete_detection(&self) -> bool {
        true
    }

    /// In-place column type changes.
    fn supports_alter_column_type(&self) -> bool {
        true
    }
}

/// Supported warehouses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    DuckDb,
    Postgres,
    TSql,
    Fabric,
    MySql,
    Snowflake,
    BigQuery,
    Redshift,
    Databricks,
    Oracle,
}

impl Dialect {
    pub const ALL: [Dialect; 10] = [
        Dialect::DuckDb,
        Dialect::Postgres,
        Dialect::TSql,
        Dialect::Fabric,
        Dialect::MySql,
        Dialect::Snowflake,
        Dialect::BigQuery,
        Dialect::Redshift,
        Dialect::Databricks,
        Dialect::Oracle,
    ];

    /// The implementation behind this variant.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::DuckDb => &DuckDb,
            Dialect::Postgres => &Postgres,
            Dialect::TSql => &TSql,
            Dialect::Fabric => &Fabric,
            Dialect::MySql => &MySql,
            Dialect::Snowflake => &Snowflake,
            Dialect::BigQuery => &BigQuery,
            Dialect::Redshift => &Redshift,
            Dialect::Databricks => &Databricks,
            Dialect::Oracle => &Oracle,
        }
    }
}

/// Error returned when a dialect name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dialect '{0}'")]
pub struct UnknownDialect(pub String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "duckdb" | "duck" => Ok(Dialect::DuckDb),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "tsql" | "mssql" | "sqlserver" | "sql_server" => Ok(Dialect::TSql),
            "fabric" | "fabric_warehouse" => Ok(Dialect::Fabric),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "snowflake" => Ok(Dialect::Snowflake),
            "bigquery" | "bq" => Ok(Dialect::BigQuery),
            "redshift" => Ok(Dialect::Redshift),
            "databricks" | "spark" => Ok(Dialect::Databricks),
            "oracle" => Ok(Dialect::Oracle),
            other => Err(UnknownDialect(other.to_string())),
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn format_null(&self) -> &'static str {
        self.dialect().format_null()
    }

    fn format_date_literal(&self, date: &str) -> String {
        self.dialect().format_date_literal(date)
    }

    fn format_timestamp_literal(&self, ts: &str) -> String {
        self.dialect().format_timestamp_literal(ts)
    }

    fn concat_operator(&self) -> &'static str {
        self.dialect().concat_operator()
    }

    fn supports_concat_operator(&self) -> bool {
        self.dialect().supports_concat_operator()
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        self.dialect().remap_function(name)
    }

    fn emit_hash256(&self, input: TokenStream) -> TokenStream {
        self.dialect().emit_hash256(input)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        self.dialect().emit_data_type(dt)
    }

    fn cast_target(&self, dt: &DataType) -> String {
        self.dialect().cast_target(dt)
    }

    fn supports_if_not_exists(&self) -> bool {
        self.dialect().supports_if_not_exists()
    }

    fn emit_missing_table_guard(&self, schema: Option<&str>, name: &str) -> Option<TokenStream> {
        self.dialect().emit_missing_table_guard(schema, name)
    }

    fn emit_create_schema(&self, schema: &str) -> Option<TokenStream> {
        self.dialect().emit_create_schema(schema)
    }

    fn add_column_keyword(&self) -> bool {
        self.dialect().add_column_keyword()
    }

    fn emit_rename_table(&self, schema: Option<&str>, from: &str, to: &str) -> TokenStream {
        self.dialect().emit_rename_table(schema, from, to)
    }

    fn emit_rename_column(
        &self,
        schema: Option<&str>,
        table: &str,
        from: &str,
        to: &str,
    ) -> TokenStream {
        self.dialect().emit_rename_column(schema, table, from, to)
    }

    fn emit_alter_column_type(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        dt: &DataType,
    ) -> Option<TokenStream> {
        self.dialect()
            .emit_alter_column_type(schema, table, column, dt)
    }

    fn create_view_keyword(&self) -> &'static str {
        self.dialect().create_view_keyword()
    }

    fn table_alias_keyword(&self) -> bool {
        self.dialect().table_alias_keyword()
    }

    fn row_number_requires_order_by(&self) -> bool {
        self.dialect().row_number_requires_order_by()
    }

    fn union_distinct_keyword(&self) -> &'static str {
        self.dialect().union_distinct_keyword()
    }

    fn update_from_style(&self) -> UpdateFromStyle {
        self.dialect().update_from_style()
    }

    fn merge_requires_terminator(&self) -> bool {
        self.dialect().merge_requires_terminator()
    }

    fn transaction_statements(&self) -> Option<(&'static str, &'static str)> {
        self.dialect().transaction_statements()
    }

    fn supports_merge(&self) -> bool {
        self.dialect().supports_merge()
    }

    fn supports_delete_detection(&self) -> bool {
        self.dialect().supports_delete_detection()
    }

    fn supports_alter_column_type(&self) -> bool {
        self.dialect().supports_alter_column_type()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_display_roundtrips_from_str() {
        for dialect in Dialect::ALL {
            assert_eq!(dialect.to_string().parse::<Dialect>(), Ok(dialect));
        }
    }

    #[test]
    fn test_dialect_aliases() {
        assert_eq!("mssql".parse::<Dialect>(), Ok(Dialect::TSql));
        assert_eq!("PostgreSQL".parse::<Dialect>(), Ok(Dialect::Postgres));
        assert_eq!("spark".parse::<Dialect>(), Ok(Dialect::Databricks));
        assert!("access".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_serde_names_match_display() {
        for dialect in Dialect::ALL {
            let json = serde_json::to_string(&dialect).unwrap();
            assert_eq!(json, format!("\"{}\"", dialect));
        }
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::DuckDb.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::TSql.quote_identifier("users"), "[users]");
        assert_eq!(Dialect::MySql.quote_identifier("users"), "`users`");
        assert_eq!(Dialect::Oracle.quote_identifier("users"), "\"users\"");
    }

    #[test]
    fn test_quote_identifier_idempotent_everywhere() {
        for dialect in Dialect::ALL {
            let once = dialect.quote_identifier("order id");
            assert_eq!(dialect.quote_identifier(&once), once, "{}", dialect);
        }
    }

    #[test]
    fn test_format_bool() {
        assert_eq!(Dialect::Postgres.format_bool(true), "TRUE");
        assert_eq!(Dialect::TSql.format_bool(true), "1");
        assert_eq!(Dialect::Oracle.format_bool(false), "0");
        assert_eq!(Dialect::BigQuery.format_bool(false), "FALSE");
    }

    #[test]
    fn test_capabilities() {
        let merge: Vec<_> = Dialect::ALL
            .into_iter()
            .filter(|d| d.supports_merge())
            .collect();
        assert_eq!(
            merge,
            vec![
                Dialect::Postgres,
                Dialect::TSql,
                Dialect::Snowflake,
                Dialect::BigQuery,
                Dialect::Databricks,
                Dialect::Oracle,
            ]
        );
        assert!(Dialect::ALL.iter().all(|d| d.supports_delete_detection()));
        assert!(!Dialect::BigQuery.supports_alter_column_type());
        assert!(!Dialect::Databricks.supports_alter_column_type());
        assert!(!Dialect::Fabric.supports_alter_column_type());
        assert!(Dialect::Postgres.supports_alter_column_type());
    }

    #[test]
    fn test_alter_column_type_matches_capability() {
        for dialect in Dialect::ALL {
            let stmt = dialect.emit_alter_column_type(Some("s"), "t", "c", &DataType::Int64);
            assert_eq!(stmt.is_some(), dialect.supports_alter_column_type(), "{}", dialect);
        }
    }

    #[test]
    fn test_fallback_dialects_can_update_from_source() {
        for dialect in Dialect::ALL.into_iter().filter(|d| !d.supports_merge()) {
            assert_ne!(dialect.update_from_style(), UpdateFromStyle::Unsupported);
            assert!(dialect.transaction_statements().is_some());
        }
    }

    #[test]
    fn test_remap_function() {
        assert_eq!(Dialect::TSql.remap_function("length"), Some("LEN"));
        assert_eq!(Dialect::Oracle.remap_function("IFNULL"), Some("NVL"));
        assert_eq!(Dialect::BigQuery.remap_function("NVL"), Some("IFNULL"));
        assert_eq!(Dialect::Postgres.remap_function("COALESCE"), None);
    }

    #[test]
    fn test_timestamp_literals() {
        let ts = "2024-01-31 08:00:00";
        assert_eq!(
            Dialect::Postgres.format_timestamp_literal(ts),
            "CAST('2024-01-31 08:00:00' AS TIMESTAMP)"
        );
        assert_eq!(
            Dialect::TSql.format_timestamp_literal(ts),
            "CAST('2024-01-31 08:00:00' AS DATETIME2)"
        );
        assert_eq!(
            Dialect::Snowflake.format_timestamp_literal(ts),
            "CAST('2024-01-31 08:00:00' AS TIMESTAMP_NTZ)"
        );
        assert_eq!(
            Dialect::Oracle.format_timestamp_literal(ts),
            "TIMESTAMP '2024-01-31 08:00:00'"
        );
        assert_eq!(
            Dialect::MySql.format_date_literal("2024-01-31"),
            "CAST('2024-01-31' AS DATE)"
        );
    }
}
