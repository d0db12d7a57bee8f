//! DuckDB dialect.
//!
//! ANSI quoting and literals. MERGE is not used: merges render through
//! the UPDATE ... FROM + INSERT fallback.

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;
use crate::sql::types::DataType;

#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_duckdb(name)
    }

    fn emit_hash256(&self, input: TokenStream) -> TokenStream {
        helpers::wrap("SHA256(", input, ")")
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_duckdb(dt)
    }
}
