//! Parse-back checks for emitted SQL.
//!
//! Rendered statements are fed to sqlparser with the closest parser
//! dialect. Load statements still carry runtime placeholders, so
//! [`validate_load_sql`] substitutes fixed run values first.

use chrono::NaiveDate;
use sqlparser::dialect::{
    DuckDbDialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SnowflakeDialect,
};
use sqlparser::parser::Parser;

use super::dialect::Dialect;
use super::template::{substitute, RuntimeValues};

/// Parse `sql` with the sqlparser dialect closest to `dialect`.
pub fn validate_sql(sql: &str, dialect: Dialect) -> Result<(), String> {
    let parser_dialect: Box<dyn sqlparser::dialect::Dialect> = match dialect {
        Dialect::Postgres | Dialect::Redshift => Box::new(PostgreSqlDialect {}),
        Dialect::DuckDb => Box::new(DuckDbDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::TSql | Dialect::Fabric => Box::new(MsSqlDialect {}),
        Dialect::Snowflake => Box::new(SnowflakeDialect {}),
        // No dedicated parser for these.
        Dialect::BigQuery | Dialect::Databricks | Dialect::Oracle => Box::new(GenericDialect {}),
    };

    Parser::parse_sql(&*parser_dialect, sql)
        .map(|_| ())
        .map_err(|e| format!("invalid SQL for {}: {}\nSQL: {}", dialect, e, sql))
}

/// Substitute placeholders with fixed values, then parse.
pub fn validate_load_sql(sql: &str, dialect: Dialect) -> Result<(), String> {
    let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or("bad fixture timestamp")?;
    let values = RuntimeValues {
        load_run_id: "test-run".into(),
        load_timestamp: ts,
        delta_cutoff: Some(ts),
    };
    let resolved = substitute(sql, dialect, &values).map_err(|e| e.to_string())?;
    validate_sql(&resolved, dialect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_sql() {
        for dialect in [Dialect::Postgres, Dialect::MySql, Dialect::DuckDb, Dialect::Fabric] {
            validate_sql("SELECT * FROM stage.stg_customer", dialect).unwrap();
        }
    }

    #[test]
    fn test_validate_invalid_sql() {
        assert!(validate_sql("SELEC * FORM stg_customer", Dialect::Postgres).is_err());
    }

    #[test]
    fn test_placeholders_resolved_before_parsing() {
        let sql = "DELETE FROM t WHERE loaded_at < {{DELTA_CUTOFF}} AND run <> {{ load_run_id }}";
        validate_load_sql(sql, Dialect::Postgres).unwrap();
    }
}
