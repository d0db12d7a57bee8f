//! MySQL dialect.
//!
//! - Backtick quoting, backslash escapes inside string literals
//! - Booleans are TINYINT(1): 1/0
//! - `||` means OR unless PIPES_AS_CONCAT is set, so concatenation uses CONCAT()
//! - No MERGE: merges render as UPDATE ... JOIN + INSERT
//! - CAST only accepts a handful of target types

use super::helpers;
use super::{SqlDialect, UpdateFromStyle};
use crate::sql::token::{Token, TokenStream};
use crate::sql::types::DataType;

#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_backslash(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn supports_concat_operator(&self) -> bool {
        false
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_mysql(name)
    }

    fn emit_hash256(&self, input: TokenStream) -> TokenStream {
        helpers::emit_hash256_sha2(input)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_mysql(dt)
    }

    fn cast_target(&self, dt: &DataType) -> String {
        helpers::cast_target_mysql(dt)
    }

    fn emit_rename_table(&self, schema: Option<&str>, from: &str, to: &str) -> TokenStream {
        // An unqualified target would move the table to the default database.
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
        ts.push(Token::Raw("MODIFY".into()))
            .space()
            .push(Token::Column)
            .space()
            .push(Token::Ident(column.into()))
            .space()
            .push(Token::Raw(self.emit_data_type(dt)));
        Some(ts)
    }

    fn update_from_style(&self) -> UpdateFromStyle {
        UpdateFromStyle::JoinClause
    }

    fn transaction_statements(&self) -> Option<(&'static str, &'static str)> {
        Some(("START TRANSACTION", "COMMIT"))
    }
}
