//! Google BigQuery dialect.
//!
//! Schemas are datasets. Column types can only be widened through a
//! restricted `SET DATA TYPE`, which is treated as unsupported.

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;
use crate::sql::types::DataType;

#[derive(Debug, Clone, Copy)]
pub struct BigQuery;

impl SqlDialect for BigQuery {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        // Backslash is an escape character in BigQuery literals.
        helpers::quote_string_backslash(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_bigquery(name)
    }

    fn emit_hash256(&self, input: TokenStream) -> TokenStream {
        helpers::wrap("TO_HEX(SHA256(", input, "))")
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_bigquery(dt)
    }

    fn cast_target(&self, dt: &DataType) -> String {
        // Parameterized types are not valid CAST targets.
        match dt {
            DataType::Varchar(_) => "STRING".into(),
            DataType::Decimal(_, _) => "NUMERIC".into(),
            other => helpers::emit_data_type_bigquery(other),
        }
    }

    fn union_distinct_keyword(&self) -> &'static str {
        // Bare UNION is a syntax error.
        "UNION DISTINCT"
    }

    fn emit_alter_column_type(
        &self,
        _schema: Option<&str>,
        _table: &str,
        _column: &str,
        _dt: &DataType,
    ) -> Option<TokenStream> {
        None
    }

    fn supports_merge(&self) -> bool {
        true
    }

    fn supports_alter_column_type(&self) -> bool {
        false
    }
}
