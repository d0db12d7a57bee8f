//! SQL generation module.
//!
//! A vendor-neutral plan model rendered into dialect-specific SQL text:
//!
//! - [`expr`] - Expression AST and builder helpers
//! - [`query`] - SELECT / UNION plans and FROM sources
//! - [`ddl`] - CREATE, ALTER (add/rename/retype), VIEW, TRUNCATE
//! - [`dml`] - INSERT, UPDATE, DELETE, MERGE (with UPDATE + INSERT fallback)
//! - [`surrogate`] - Surrogate-key hashing DSL
//! - [`template`] - Runtime placeholder substitution
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod ddl;
pub mod dialect;
pub mod dml;
pub mod expr;
pub mod query;
pub mod surrogate;
pub mod template;
pub mod token;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use thiserror::Error;

pub use dialect::{Dialect, SqlDialect};
pub use expr::{render_expr, render_literal, Expr, Literal};
pub use query::{render_select, QueryPlan, Select};
pub use surrogate::SurrogateError;
pub use token::{Token, TokenStream};
pub use types::DataType;

/// Errors raised while rendering SQL.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SqlError {
    #[error("{dialect} cannot express {construct}")]
    UnsupportedConstruct { dialect: Dialect, construct: String },

    #[error("invalid literal '{0}'")]
    InvalidLiteral(String),

    #[error("empty {0}")]
    EmptyExpression(&'static str),

    #[error("merge into {0} declares no key columns")]
    EmptyMerge(String),

    #[error("surrogate expression: {0}")]
    Surrogate(#[from] SurrogateError),
}

pub type SqlResult<T> = Result<T, SqlError>;

/// Join rendered statements into one script, terminating each with `;`.
pub fn to_script(statements: &[String]) -> String {
    statements
        .iter()
        .map(|s| {
            let s = s.trim_end();
            if s.ends_with(';') {
                s.to_string()
            } else {
                format!("{};", s)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_script_terminates_once() {
        let script = to_script(&["SELECT 1".into(), "MERGE INTO t USING s ON (1 = 1);".into()]);
        assert_eq!(script, "SELECT 1;\n\nMERGE INTO t USING s ON (1 = 1);");
    }

    #[test]
    fn test_unsupported_construct_message() {
        let err = SqlError::UnsupportedConstruct {
            dialect: Dialect::Oracle,
            construct: "CREATE SCHEMA".into(),
        };
        assert_eq!(err.to_string(), "oracle cannot express CREATE SCHEMA");
    }
}
