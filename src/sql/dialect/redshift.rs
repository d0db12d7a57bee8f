//! Amazon Redshift dialect.
//!
//! Postgres-derived, but merges go through the UPDATE ... FROM fallback
//! and column type changes are limited to widening VARCHAR.

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;
use crate::sql::types::DataType;

#[derive(Debug, Clone, Copy)]
pub struct Redshift;

impl SqlDialect for Redshift {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_postgres(name)
    }

    fn emit_hash256(&self, input: TokenStream) -> TokenStream {
        helpers::emit_hash256_sha2(input)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_redshift(dt)
    }

    fn transaction_statements(&self) -> Option<(&'static str, &'static str)> {
        Some(("BEGIN", "COMMIT"))
    }
}
