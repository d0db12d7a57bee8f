//! Microsoft Fabric warehouse dialect.
//!
//! T-SQL surface with warehouse restrictions: no MERGE (the UPDATE ... FROM
//! fallback is used), no in-place column type changes, VARCHAR only.

use super::helpers;
use super::{SqlDialect, TSql, UpdateFromStyle};
use crate::sql::token::TokenStream;
use crate::sql::types::DataType;

#[derive(Debug, Clone, Copy)]
pub struct Fabric;

impl SqlDialect for Fabric {
    fn name(&self) -> &'static str {
        "fabric"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn concat_operator(&self) -> &'static str {
        "+"
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_tsql(name)
    }

    fn emit_hash256(&self, input: TokenStream) -> TokenStream {
        helpers::emit_hash256_tsql(input)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_fabric(dt)
    }

    fn supports_if_not_exists(&self) -> bool {
        false
    }

    fn emit_missing_table_guard(&self, schema: Option<&str>, name: &str) -> Option<TokenStream> {
        TSql.emit_missing_table_guard(schema, name)
    }

    fn emit_create_schema(&self, schema: &str) -> Option<TokenStream> {
        TSql.emit_create_schema(schema)
    }

    fn add_column_keyword(&self) -> bool {
        false
    }

    fn emit_rename_table(&self, schema: Option<&str>, from: &str, to: &str) -> TokenStream {
        TSql.emit_rename_table(schema, from, to)
    }

    fn emit_rename_column(
        &self,
        schema: Option<&str>,
        table: &str,
        from: &str,
        to: &str,
    ) -> TokenStream {
        TSql.emit_rename_column(schema, table, from, to)
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

    fn create_view_keyword(&self) -> &'static str {
        "CREATE OR ALTER VIEW"
    }

    fn row_number_requires_order_by(&self) -> bool {
        true
    }

    fn update_from_style(&self) -> UpdateFromStyle {
        UpdateFromStyle::TSqlFrom
    }

    fn supports_alter_column_type(&self) -> bool {
        false
    }
}
