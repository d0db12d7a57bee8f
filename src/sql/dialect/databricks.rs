//! Databricks (Spark SQL / Delta Lake) dialect.
//!
//! Delta tables support MERGE natively. Multi-table UPDATE and in-place
//! type changes are not available; neither is a multi-statement
//! transaction.

use super::helpers;
use super::{SqlDialect, UpdateFromStyle};
use crate::sql::token::TokenStream;
use crate::sql::types::DataType;

#[derive(Debug, Clone, Copy)]
pub struct Databricks;

impl SqlDialect for Databricks {
    fn name(&self) -> &'static str {
        "databricks"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_backslash(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_databricks(name)
    }

    fn emit_hash256(&self, input: TokenStream) -> TokenStream {
        helpers::emit_hash256_sha2(input)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_databricks(dt)
    }

    fn emit_rename_table(&self, schema: Option<&str>, from: &str, to: &str) -> TokenStream {
        helpers::emit_rename_table_standard(schema, from, to, true)
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

    fn update_from_style(&self) -> UpdateFromStyle {
        UpdateFromStyle::Unsupported
    }

    fn transaction_statements(&self) -> Option<(&'static str, &'static str)> {
        None
    }

    fn row_number_requires_order_by(&self) -> bool {
        true
    }

    fn supports_merge(&self) -> bool {
        true
    }

    fn supports_alter_column_type(&self) -> bool {
        false
    }
}
