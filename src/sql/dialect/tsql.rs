//! T-SQL (SQL Server / Azure SQL) dialect.
//!
//! Differences from ANSI that matter for load SQL:
//! - Square bracket quoting and `N'...'` for non-ASCII strings
//! - No boolean literals (1/0)
//! - `+` for string concatenation
//! - No `IF NOT EXISTS` on CREATE TABLE / CREATE SCHEMA; guarded with catalog lookups
//! - Renames through `sp_rename`
//! - MERGE must be terminated with `;`

use super::helpers;
use super::{SqlDialect, UpdateFromStyle};
use crate::sql::token::{Token, TokenStream};
use crate::sql::types::DataType;

#[derive(Debug, Clone, Copy)]
pub struct TSql;

impl TSql {
    /// `[schema].[name]` as it appears inside sp_rename / OBJECT_ID strings.
    fn object_name(schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(s) => format!(
                "{}.{}",
                helpers::quote_bracket(s),
                helpers::quote_bracket(name)
            ),
            None => helpers::quote_bracket(name),
        }
    }
}

impl SqlDialect for TSql {
    fn name(&self) -> &'static str {
        "tsql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        if s.is_ascii() {
            helpers::quote_string_single(s)
        } else {
            helpers::quote_string_unicode(s)
        }
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
        helpers::emit_data_type_tsql(dt)
    }

    fn supports_if_not_exists(&self) -> bool {
        false
    }

    fn emit_missing_table_guard(&self, schema: Option<&str>, name: &str) -> Option<TokenStream> {
        let mut ts = TokenStream::new();
        ts.push(Token::Raw("IF OBJECT_ID(".into()))
            .push(Token::Raw(helpers::quote_string_unicode(&Self::object_name(
                schema, name,
            ))))
            .push(Token::Raw(", N'U') IS NULL".into()))
            .space();
        Some(ts)
    }

    fn emit_create_schema(&self, schema: &str) -> Option<TokenStream> {
        let create = format!("CREATE SCHEMA {}", helpers::quote_bracket(schema));
        let mut ts = TokenStream::new();
        ts.push(Token::Raw(
            "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = ".into(),
        ))
        .push(Token::Raw(helpers::quote_string_unicode(schema)))
        .push(Token::Raw(") EXEC(".into()))
        .push(Token::Raw(helpers::quote_string_unicode(&create)))
        .push(Token::Raw(")".into()));
        Some(ts)
    }

    fn add_column_keyword(&self) -> bool {
        false
    }

    fn emit_rename_table(&self, schema: Option<&str>, from: &str, to: &str) -> TokenStream {
        helpers::emit_sp_rename(Self::object_name(schema, from), to, false)
    }

    fn emit_rename_column(
        &self,
        schema: Option<&str>,
        table: &str,
        from: &str,
        to: &str,
    ) -> TokenStream {
        let object = format!(
            "{}.{}",
            Self::object_name(schema, table),
            helpers::quote_bracket(from)
        );
        helpers::emit_sp_rename(object, to, true)
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
            .push(Token::Raw(self.emit_data_type(dt)));
        Some(ts)
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

    fn merge_requires_terminator(&self) -> bool {
        true
    }

    fn supports_merge(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::dialect::Dialect;

    #[test]
    fn test_unicode_strings_get_n_prefix() {
        assert_eq!(TSql.quote_string("plain"), "'plain'");
        assert_eq!(TSql.quote_string("café"), "N'café'");
    }

    #[test]
    fn test_sp_rename_forms() {
        let table = TSql
            .emit_rename_table(Some("rawcore"), "rc_client", "rc_customer")
            .serialize(Dialect::TSql);
        assert_eq!(
            table,
            "EXEC sp_rename N'[rawcore].[rc_client]', N'rc_customer'"
        );

        let column = TSql
            .emit_rename_column(Some("rawcore"), "rc_customer", "old_col", "new_col")
            .serialize(Dialect::TSql);
        assert_eq!(
            column,
            "EXEC sp_rename N'[rawcore].[rc_customer].[old_col]', N'new_col', 'COLUMN'"
        );
    }

    #[test]
    fn test_create_schema_guarded() {
        let sql = TSql
            .emit_create_schema("stage")
            .map(|ts| ts.serialize(Dialect::TSql))
            .unwrap();
        assert_eq!(
            sql,
            "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = N'stage') EXEC(N'CREATE SCHEMA [stage]')"
        );
    }
}
