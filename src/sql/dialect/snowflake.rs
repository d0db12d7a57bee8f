//! Snowflake dialect.
//!
//! Renaming a table without a schema-qualified target moves it into the
//! session's current schema, so renames always qualify the new name.

use super::helpers;
use super::SqlDialect;
use crate::sql::token::{Token, TokenStream};
use crate::sql::types::DataType;

#[derive(Debug, Clone, Copy)]
pub struct Snowflake;

impl SqlDialect for Snowflake {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_snowflake(name)
    }

    fn emit_hash256(&self, input: TokenStream) -> TokenStream {
        helpers::emit_hash256_sha2(input)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_snowflake(dt)
    }

    fn emit_rename_table(&self, schema: Option<&str>, from: &str, to: &str) -> TokenStream {
        helpers::emit_rename_table_standard(schema, from, to, true)
    }

    fn emit_alter_column_type(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        dt: &DataType,
    ) -> Option<TokenStream> {
        let mut ts = helpers::alter_table(schema, table);
        ts.push(Token::Alter)
            .space()
            .push(Token::Column)
            .space()
            .push(Token::Ident(column.into()))
            .space()
            .push(Token::Raw(format!("SET DATA TYPE {}", self.emit_data_type(dt))));
        Some(ts)
    }

    fn row_number_requires_order_by(&self) -> bool {
        true
    }

    fn supports_merge(&self) -> bool {
        true
    }
}
