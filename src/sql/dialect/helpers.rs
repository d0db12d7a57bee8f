//! Building blocks shared by the dialect implementations.
//!
//! Dialects compose these rather than re-implementing quoting, type
//! spelling, hashing and DDL forms one by one.

use crate::sql::token::{Token, TokenStream};
use crate::sql::types::DataType;

// =============================================================================
// Identifier Quoting
// =============================================================================

/// `"ident"`. Postgres, DuckDB, Snowflake, Redshift, Oracle.
pub fn quote_double(ident: &str) -> String {
    quote_with(ident, '"', '"')
}

/// `` `ident` ``. MySQL, BigQuery, Databricks.
pub fn quote_backtick(ident: &str) -> String {
    quote_with(ident, '`', '`')
}

/// `[ident]`. SQL Server and Fabric.
pub fn quote_bracket(ident: &str) -> String {
    quote_with(ident, '[', ']')
}

/// Quote `ident`, escaping `close` by doubling. An identifier that is
/// already a well-formed quoted identifier is returned unchanged so that
/// quoting twice is a no-op.
fn quote_with(ident: &str, open: char, close: char) -> String {
    if is_quoted(ident, open, close) {
        return ident.to_string();
    }
    let escaped = ident.replace(close, &format!("{close}{close}"));
    format!("{open}{escaped}{close}")
}

fn is_quoted(ident: &str, open: char, close: char) -> bool {
    let Some(inner) = ident
        .strip_prefix(open)
        .and_then(|rest| rest.strip_suffix(close))
    else {
        return false;
    };

    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == close && chars.next() != Some(close) {
            return false;
        }
    }
    true
}

// =============================================================================
// String Quoting
// =============================================================================

/// `'text'` with embedded quotes doubled.
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// `N'text'` for T-SQL Unicode literals.
pub fn quote_string_unicode(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

/// MySQL and Databricks treat backslash as an escape inside literals.
pub fn quote_string_backslash(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// T-SQL, Fabric, MySQL and Oracle have no boolean literal in expressions.
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Function Remapping
// =============================================================================

pub fn remap_function_postgres(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" | "IFNULL" | "ISNULL" => Some("COALESCE"),
        "LEN" => Some("LENGTH"),
        "GETDATE" | "SYSDATE" => Some("NOW"),
        _ => None,
    }
}

pub fn remap_function_duckdb(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" | "IFNULL" | "ISNULL" => Some("COALESCE"),
        "LEN" => Some("LENGTH"),
        "GETDATE" | "SYSDATE" => Some("NOW"),
        _ => None,
    }
}

pub fn remap_function_tsql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "LENGTH" | "CHAR_LENGTH" => Some("LEN"),
        "SUBSTR" => Some("SUBSTRING"),
        "NOW" | "SYSDATE" => Some("SYSUTCDATETIME"),
        "NVL" | "IFNULL" => Some("ISNULL"),
        _ => None,
    }
}

pub fn remap_function_mysql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" | "ISNULL" => Some("IFNULL"),
        "LEN" => Some("CHAR_LENGTH"),
        "GETDATE" | "SYSDATE" => Some("NOW"),
        _ => None,
    }
}

pub fn remap_function_snowflake(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "IFNULL" | "ISNULL" => Some("NVL"),
        "LEN" => Some("LENGTH"),
        "GETDATE" => Some("CURRENT_TIMESTAMP"),
        _ => None,
    }
}

pub fn remap_function_bigquery(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" | "ISNULL" => Some("IFNULL"),
        "LEN" | "LENGTH" => Some("CHAR_LENGTH"),
        "GETDATE" | "NOW" | "SYSDATE" => Some("CURRENT_TIMESTAMP"),
        _ => None,
    }
}

pub fn remap_function_databricks(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" | "ISNULL" | "IFNULL" => Some("COALESCE"),
        "LEN" => Some("LENGTH"),
        "GETDATE" | "SYSDATE" => Some("CURRENT_TIMESTAMP"),
        _ => None,
    }
}

pub fn remap_function_oracle(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "IFNULL" | "ISNULL" => Some("NVL"),
        "LEN" | "CHAR_LENGTH" => Some("LENGTH"),
        "SUBSTRING" => Some("SUBSTR"),
        "NOW" | "GETDATE" => Some("SYSTIMESTAMP"),
        _ => None,
    }
}

// =============================================================================
// Data Type Emission
// =============================================================================

pub fn emit_data_type_postgres(dt: &DataType) -> String {
    match dt {
        DataType::Bool => "BOOLEAN".into(),
        DataType::Int8 | DataType::Int16 => "SMALLINT".into(),
        DataType::Int32 => "INTEGER".into(),
        DataType::Int64 => "BIGINT".into(),
        DataType::Float32 => "REAL".into(),
        DataType::Float64 => "DOUBLE PRECISION".into(),
        DataType::Decimal(p, s) => format!("NUMERIC({}, {})", p, s),
        DataType::String => "TEXT".into(),
        DataType::Char(n) => format!("CHAR({})", n),
        DataType::Varchar(n) => format!("VARCHAR({})", n),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp => "TIMESTAMP".into(),
        DataType::TimestampTz => "TIMESTAMPTZ".into(),
        DataType::Binary => "BYTEA".into(),
        DataType::Json => "JSONB".into(),
        DataType::Uuid => "UUID".into(),
    }
}

pub fn emit_data_type_duckdb(dt: &DataType) -> String {
    match dt {
        DataType::Int8 => "TINYINT".into(),
        DataType::Float64 => "DOUBLE".into(),
        DataType::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
        DataType::String => "VARCHAR".into(),
        DataType::Binary => "BLOB".into(),
        DataType::Json => "JSON".into(),
        other => emit_data_type_postgres(other),
    }
}

/// Redshift's TEXT silently means VARCHAR(256).
pub fn emit_data_type_redshift(dt: &DataType) -> String {
    match dt {
        DataType::String => "VARCHAR(65535)".into(),
        DataType::Binary => "VARBYTE".into(),
        DataType::Json => "SUPER".into(),
        DataType::Uuid => "CHAR(36)".into(),
        DataType::Time => "TIME".into(),
        other => emit_data_type_postgres(other),
    }
}

pub fn emit_data_type_tsql(dt: &DataType) -> String {
    match dt {
        DataType::Bool => "BIT".into(),
        DataType::Int8 => "TINYINT".into(),
        DataType::Int16 => "SMALLINT".into(),
        DataType::Int32 => "INT".into(),
        DataType::Int64 => "BIGINT".into(),
        DataType::Float32 => "REAL".into(),
        DataType::Float64 => "FLOAT".into(),
        DataType::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
        DataType::String | DataType::Json => "NVARCHAR(MAX)".into(),
        DataType::Char(n) => format!("NCHAR({})", n),
        DataType::Varchar(n) => format!("NVARCHAR({})", n),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp => "DATETIME2".into(),
        DataType::TimestampTz => "DATETIMEOFFSET".into(),
        DataType::Binary => "VARBINARY(MAX)".into(),
        DataType::Uuid => "UNIQUEIDENTIFIER".into(),
    }
}

/// Fabric warehouses have no NVARCHAR, TINYINT or DATETIMEOFFSET and cap
/// fractional seconds at six digits.
pub fn emit_data_type_fabric(dt: &DataType) -> String {
    match dt {
        DataType::Int8 => "SMALLINT".into(),
        DataType::String | DataType::Json => "VARCHAR(MAX)".into(),
        DataType::Char(n) => format!("CHAR({})", n),
        DataType::Varchar(n) => format!("VARCHAR({})", n),
        DataType::Time => "TIME(6)".into(),
        DataType::Timestamp | DataType::TimestampTz => "DATETIME2(6)".into(),
        other => emit_data_type_tsql(other),
    }
}

pub fn emit_data_type_mysql(dt: &DataType) -> String {
    match dt {
        DataType::Bool => "TINYINT(1)".into(),
        DataType::Int8 => "TINYINT".into(),
        DataType::Int16 => "SMALLINT".into(),
        DataType::Int32 => "INT".into(),
        DataType::Int64 => "BIGINT".into(),
        DataType::Float32 => "FLOAT".into(),
        DataType::Float64 => "DOUBLE".into(),
        DataType::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
        DataType::String => "LONGTEXT".into(),
        DataType::Char(n) => format!("CHAR({})", n),
        DataType::Varchar(n) => format!("VARCHAR({})", n),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME(6)".into(),
        DataType::Timestamp => "DATETIME(6)".into(),
        DataType::TimestampTz => "TIMESTAMP(6)".into(),
        DataType::Binary => "LONGBLOB".into(),
        DataType::Json => "JSON".into(),
        DataType::Uuid => "CHAR(36)".into(),
    }
}

/// MySQL only accepts a restricted set of CAST targets.
pub fn cast_target_mysql(dt: &DataType) -> String {
    match dt {
        DataType::Bool | DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            "SIGNED".into()
        }
        DataType::Float32 => "FLOAT".into(),
        DataType::Float64 => "DOUBLE".into(),
        DataType::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
        DataType::String | DataType::Uuid => "CHAR".into(),
        DataType::Char(n) | DataType::Varchar(n) => format!("CHAR({})", n),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME(6)".into(),
        DataType::Timestamp | DataType::TimestampTz => "DATETIME(6)".into(),
        DataType::Binary => "BINARY".into(),
        DataType::Json => "JSON".into(),
    }
}

pub fn emit_data_type_snowflake(dt: &DataType) -> String {
    match dt {
        DataType::Bool => "BOOLEAN".into(),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            "NUMBER(38, 0)".into()
        }
        DataType::Float32 | DataType::Float64 => "FLOAT".into(),
        DataType::Decimal(p, s) => format!("NUMBER({}, {})", p, s),
        DataType::String => "VARCHAR".into(),
        DataType::Char(n) => format!("CHAR({})", n),
        DataType::Varchar(n) => format!("VARCHAR({})", n),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp => "TIMESTAMP_NTZ".into(),
        DataType::TimestampTz => "TIMESTAMP_TZ".into(),
        DataType::Binary => "BINARY".into(),
        DataType::Json => "VARIANT".into(),
        DataType::Uuid => "VARCHAR(36)".into(),
    }
}

pub fn emit_data_type_bigquery(dt: &DataType) -> String {
    match dt {
        DataType::Bool => "BOOL".into(),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => "INT64".into(),
        DataType::Float32 | DataType::Float64 => "FLOAT64".into(),
        DataType::Decimal(p, s) if *p > 38 => format!("BIGNUMERIC({}, {})", p, s),
        DataType::Decimal(p, s) => format!("NUMERIC({}, {})", p, s),
        DataType::String | DataType::Char(_) | DataType::Uuid => "STRING".into(),
        DataType::Varchar(n) => format!("STRING({})", n),
        DataType::Date => "DATE".into(),
        DataType::Time => "TIME".into(),
        DataType::Timestamp => "DATETIME".into(),
        DataType::TimestampTz => "TIMESTAMP".into(),
        DataType::Binary => "BYTES".into(),
        DataType::Json => "JSON".into(),
    }
}

pub fn emit_data_type_databricks(dt: &DataType) -> String {
    match dt {
        DataType::Bool => "BOOLEAN".into(),
        DataType::Int8 => "TINYINT".into(),
        DataType::Int16 => "SMALLINT".into(),
        DataType::Int32 => "INT".into(),
        DataType::Int64 => "BIGINT".into(),
        DataType::Float32 => "FLOAT".into(),
        DataType::Float64 => "DOUBLE".into(),
        DataType::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
        DataType::String | DataType::Char(_) | DataType::Varchar(_) | DataType::Uuid => {
            "STRING".into()
        }
        DataType::Date => "DATE".into(),
        DataType::Time => "STRING".into(),
        DataType::Timestamp => "TIMESTAMP_NTZ".into(),
        DataType::TimestampTz => "TIMESTAMP".into(),
        DataType::Binary => "BINARY".into(),
        DataType::Json => "STRING".into(),
    }
}

pub fn emit_data_type_oracle(dt: &DataType) -> String {
    match dt {
        DataType::Bool => "NUMBER(1)".into(),
        DataType::Int8 => "NUMBER(3)".into(),
        DataType::Int16 => "NUMBER(5)".into(),
        DataType::Int32 => "NUMBER(10)".into(),
        DataType::Int64 => "NUMBER(19)".into(),
        DataType::Float32 => "BINARY_FLOAT".into(),
        DataType::Float64 => "BINARY_DOUBLE".into(),
        DataType::Decimal(p, s) => format!("NUMBER({}, {})", p, s),
        DataType::String | DataType::Json => "CLOB".into(),
        DataType::Char(n) => format!("CHAR({} CHAR)", n),
        DataType::Varchar(n) => format!("VARCHAR2({} CHAR)", n),
        DataType::Date => "DATE".into(),
        DataType::Time => "VARCHAR2(16)".into(),
        DataType::Timestamp => "TIMESTAMP".into(),
        DataType::TimestampTz => "TIMESTAMP WITH TIME ZONE".into(),
        DataType::Binary => "BLOB".into(),
        DataType::Uuid => "VARCHAR2(36)".into(),
    }
}

// =============================================================================
// Hashing
// =============================================================================

/// Wrap `input` as `PREFIX input SUFFIX`.
pub fn wrap(prefix: &str, input: TokenStream, suffix: &str) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Raw(prefix.into()))
        .append(&input)
        .push(Token::Raw(suffix.into()));
    ts
}

/// `SHA2(x, 256)`. MySQL, Snowflake, Redshift, Databricks.
pub fn emit_hash256_sha2(input: TokenStream) -> TokenStream {
    wrap("SHA2(", input, ", 256)")
}

pub fn emit_hash256_postgres(input: TokenStream) -> TokenStream {
    wrap("ENCODE(SHA256(CONVERT_TO(", input, ", 'UTF8')), 'hex')")
}

/// HASHBYTES over VARCHAR so the digest matches the UTF-8 digests of the
/// other vendors for ASCII keys.
pub fn emit_hash256_tsql(input: TokenStream) -> TokenStream {
    wrap(
        "LOWER(CONVERT(VARCHAR(64), HASHBYTES('SHA2_256', CONVERT(VARCHAR(MAX), ",
        input,
        ")), 2))",
    )
}

// =============================================================================
// DDL Forms
// =============================================================================

pub fn qualified(schema: Option<&str>, name: &str) -> Token {
    Token::QualifiedIdent {
        schema: schema.map(str::to_string),
        name: name.to_string(),
    }
}

/// `ALTER TABLE <schema.table> `
pub fn alter_table(schema: Option<&str>, table: &str) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Alter)
        .space()
        .push(Token::Table)
        .space()
        .push(qualified(schema, table))
        .space();
    ts
}

/// `ALTER TABLE s.from RENAME TO to`, target optionally schema-qualified.
pub fn emit_rename_table_standard(
    schema: Option<&str>,
    from: &str,
    to: &str,
    qualify_target: bool,
) -> TokenStream {
    let mut ts = alter_table(schema, from);
    let target = if qualify_target {
        qualified(schema, to)
    } else {
        Token::Ident(to.into())
    };
    ts.push(Token::Rename)
        .space()
        .push(Token::To)
        .space()
        .push(target);
    ts
}

/// `EXEC sp_rename N'[s].[t]', N'new'` and the `'COLUMN'` variant.
pub fn emit_sp_rename(object: String, new_name: &str, column: bool) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Raw("EXEC sp_rename ".into()))
        .push(Token::Raw(quote_string_unicode(&object)))
        .comma()
        .space()
        .push(Token::Raw(quote_string_unicode(new_name)));
    if column {
        ts.comma().space().push(Token::Raw("'COLUMN'".into()));
    }
    ts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_is_idempotent() {
        assert_eq!(quote_double("name"), "\"name\"");
        assert_eq!(quote_double(&quote_double("name")), "\"name\"");
        assert_eq!(quote_bracket(&quote_bracket("a]b")), "[a]]b]");
        assert_eq!(quote_backtick(&quote_backtick("a`b")), "`a``b`");
    }

    #[test]
    fn test_malformed_quoted_is_requoted() {
        // Inner quote is not doubled, so this is a name containing quotes.
        assert_eq!(quote_double("\"a\"b\""), "\"\"\"a\"\"b\"\"\"");
    }

    #[test]
    fn test_backslash_strings() {
        assert_eq!(quote_string_backslash(r"C:\tmp"), r"'C:\\tmp'");
        assert_eq!(quote_string_backslash("it's"), "'it''s'");
    }

    #[test]
    fn test_type_spellings() {
        assert_eq!(emit_data_type_redshift(&DataType::String), "VARCHAR(65535)");
        assert_eq!(emit_data_type_fabric(&DataType::Varchar(20)), "VARCHAR(20)");
        assert_eq!(emit_data_type_tsql(&DataType::Varchar(20)), "NVARCHAR(20)");
        assert_eq!(emit_data_type_bigquery(&DataType::Int32), "INT64");
        assert_eq!(emit_data_type_oracle(&DataType::Varchar(10)), "VARCHAR2(10 CHAR)");
        assert_eq!(cast_target_mysql(&DataType::String), "CHAR");
    }
}
