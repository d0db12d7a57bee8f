//! PostgreSQL dialect (15+ for MERGE).

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
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
        helpers::emit_hash256_postgres(input)
    }

    fn transaction_statements(&self) -> Option<(&'static str, &'static str)> {
        Some(("BEGIN", "COMMIT"))
    }

    fn supports_merge(&self) -> bool {
        true
    }
}
