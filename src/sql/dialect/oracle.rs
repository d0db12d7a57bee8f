//! Oracle dialect.
//!
//! - No boolean literal before 23ai (1/0)
//! - ANSI typed literals (`DATE '...'`, `TIMESTAMP '...'`) avoid NLS-dependent casts
//! - Schemas are users and cannot be created by the loader
//! - Transactions are implicit; there is no BEGIN statement

use super::helpers;
use super::{SqlDialect, UpdateFromStyle};
use crate::sql::token::{Token, TokenStream};
use crate::sql::types::DataType;

#[derive(Debug, Clone, Copy)]
pub struct Oracle;

impl SqlDialect for Oracle {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn format_date_literal(&self, date: &str) -> String {
        format!("DATE {}", self.quote_string(date))
    }

    fn format_timestamp_literal(&self, ts: &str) -> String {
        format!("TIMESTAMP {}", self.quote_string(ts))
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_oracle(name)
    }

    fn emit_hash256(&self, input: TokenStream) -> TokenStream {
        helpers::wrap("LOWER(RAWTOHEX(STANDARD_HASH(", input, ", 'SHA256')))")
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_oracle(dt)
    }

    fn cast_target(&self, dt: &DataType) -> String {
        // CLOB is not a valid CAST target for string building.
        match dt {
            DataType::String | DataType::Json => "VARCHAR2(4000)".into(),
            other => helpers::emit_data_type_oracle(other),
        }
    }

    fn supports_if_not_exists(&self) -> bool {
        false
    }

    fn emit_create_schema(&self, _schema: &str) -> Option<TokenStream> {
        None
    }

    fn add_column_keyword(&self) -> bool {
        false
    }

    fn emit_alter_column_type(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        dt: &DataType,
    ) -> Option<TokenStream> {
        let mut ts = helpers::alter_table(schema, table);
        ts.push(Token::Raw("MODIFY".into()))
            .space()
            .lparen()
            .push(Token::Ident(column.into()))
            .space()
            .push(Token::Raw(self.emit_data_type(dt)))
            .rparen();
        Some(ts)
    }

    fn table_alias_keyword(&self) -> bool {
        false
    }

    fn row_number_requires_order_by(&self) -> bool {
        true
    }

    fn update_from_style(&self) -> UpdateFromStyle {
        UpdateFromStyle::Unsupported
    }

    fn transaction_statements(&self) -> Option<(&'static str, &'static str)> {
        None
    }

    fn supports_merge(&self) -> bool {
        true
    }
}
