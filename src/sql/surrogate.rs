//! Surrogate-key hashing DSL.
//!
//! Columns may declare how their surrogate key is built with a tiny
//! expression language:
//!
//! ```text
//! expr   := concat | col | string
//! concat := "concat" "(" expr ("," expr)* ")"
//! col    := "col" "(" string ")"
//! string := '"' chars '"' | "'" chars "'"
//! ```
//!
//! e.g. `concat(col("region"), '|', col("customer_id"))`.
//!
//! Whatever order the expression lists its columns in, the hash is built
//! over the column components sorted by name. String literals only choose
//! the separator. Every component is cast to text and NULL is replaced by
//! [`NULL_TOKEN`] so `(NULL, 'a')` and `('a', NULL)` hash differently.

use super::expr::{cast, coalesce, hash256, lit_str, placeholder, table_col, col, Expr};
use super::template::Placeholder;
use super::types::DataType;
use thiserror::Error;

/// Stand-in for NULL components before hashing.
pub const NULL_TOKEN: &str = "^^NULL^^";

/// Separator used when the expression declares none.
pub const DEFAULT_SEPARATOR: &str = "|";

/// History-key component replaced by the run's load timestamp.
pub const VERSION_STARTED_AT: &str = "version_started_at";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SurrogateError {
    #[error("at offset {offset}: expected {expected}")]
    Expected {
        offset: usize,
        expected: &'static str,
    },

    #[error("at offset {offset}: unknown function '{name}'")]
    UnknownFunction { offset: usize, name: String },

    #[error("at offset {offset}: unterminated string")]
    UnterminatedString { offset: usize },

    #[error("at offset {offset}: unexpected trailing input")]
    TrailingInput { offset: usize },

    #[error("surrogate expression references no columns")]
    NoColumns,
}

/// Parsed surrogate expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurrogateExpr {
    Concat(Vec<SurrogateExpr>),
    Col(String),
    Lit(String),
}

impl SurrogateExpr {
    /// Column names in declaration order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = vec![];
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            SurrogateExpr::Concat(parts) => parts.iter().for_each(|p| p.collect_columns(out)),
            SurrogateExpr::Col(name) => out.push(name),
            SurrogateExpr::Lit(_) => {}
        }
    }

    /// First literal in the expression, used as the component separator.
    pub fn separator(&self) -> Option<&str> {
        match self {
            SurrogateExpr::Concat(parts) => parts.iter().find_map(|p| p.separator()),
            SurrogateExpr::Col(_) => None,
            SurrogateExpr::Lit(s) => Some(s),
        }
    }

    /// Canonical hash expression over the referenced columns.
    pub fn to_hash_expr(&self, qualifier: Option<&str>) -> Result<Expr, SurrogateError> {
        let columns: Vec<String> = self.columns().into_iter().map(str::to_string).collect();
        let separator = self.separator().unwrap_or(DEFAULT_SEPARATOR);
        key_hash(&columns, separator, qualifier)
    }
}

/// Parse a surrogate expression.
pub fn parse(input: &str) -> Result<SurrogateExpr, SurrogateError> {
    let mut parser = Parser { input, pos: 0 };
    let expr = parser.expr()?;
    parser.skip_ws();
    if parser.pos != input.len() {
        return Err(SurrogateError::TrailingInput { offset: parser.pos });
    }
    Ok(expr)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char, expected: &'static str) -> Result<(), SurrogateError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(SurrogateError::Expected {
                offset: self.pos,
                expected,
            })
        }
    }

    fn expr(&mut self) -> Result<SurrogateExpr, SurrogateError> {
        self.skip_ws();
        match self.rest().chars().next() {
            Some('"') | Some('\'') => Ok(SurrogateExpr::Lit(self.string()?)),
            Some(c) if c.is_ascii_alphabetic() => {
                let start = self.pos;
                let name = self.ident();
                match name.to_ascii_lowercase().as_str() {
                    "concat" => {
                        self.expect('(', "'(' after concat")?;
                        let mut parts = vec![self.expr()?];
                        while self.eat(',') {
                            parts.push(self.expr()?);
                        }
                        self.expect(')', "')' closing concat")?;
                        Ok(SurrogateExpr::Concat(parts))
                    }
                    "col" => {
                        self.expect('(', "'(' after col")?;
                        self.skip_ws();
                        let column = self.string()?;
                        self.expect(')', "')' closing col")?;
                        Ok(SurrogateExpr::Col(column))
                    }
                    _ => Err(SurrogateError::UnknownFunction {
                        offset: start,
                        name,
                    }),
                }
            }
            _ => Err(SurrogateError::Expected {
                offset: self.pos,
                expected: "concat(...), col(\"...\") or a string literal",
            }),
        }
    }

    fn ident(&mut self) -> String {
        let len = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(self.rest().len());
        let name = self.rest()[..len].to_string();
        self.pos += len;
        name
    }

    /// Quoted string; the quote character is escaped by doubling.
    fn string(&mut self) -> Result<String, SurrogateError> {
        let start = self.pos;
        let quote = match self.rest().chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                return Err(SurrogateError::Expected {
                    offset: self.pos,
                    expected: "a quoted string",
                })
            }
        };
        self.pos += 1;

        let mut out = String::new();
        loop {
            let mut chars = self.rest().chars();
            match chars.next() {
                None => return Err(SurrogateError::UnterminatedString { offset: start }),
                Some(c) if c == quote => {
                    self.pos += 1;
                    if self.rest().starts_with(quote) {
                        out.push(quote);
                        self.pos += 1;
                    } else {
                        return Ok(out);
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }
}

/// A hashed component: its sort name and the expression producing it.
struct Component {
    sort_name: String,
    expr: Expr,
}

fn column_expr(name: &str, qualifier: Option<&str>) -> Expr {
    match qualifier {
        Some(q) => table_col(q, name),
        None => col(name),
    }
}

/// `COALESCE(CAST(x AS text), '^^NULL^^')`
fn null_safe(expr: Expr) -> Expr {
    coalesce(vec![cast(expr, DataType::String), lit_str(NULL_TOKEN)])
}

fn hash_components(mut components: Vec<Component>, separator: &str) -> Result<Expr, SurrogateError> {
    if components.is_empty() {
        return Err(SurrogateError::NoColumns);
    }
    components.sort_by(|a, b| a.sort_name.cmp(&b.sort_name));

    let mut parts = Vec::with_capacity(components.len() * 2);
    for (i, component) in components.into_iter().enumerate() {
        if i > 0 {
            parts.push(lit_str(separator));
        }
        parts.push(null_safe(component.expr));
    }
    Ok(hash256(Expr::Concat(parts)))
}

/// Hash of `columns`, sorted by name, NULL-safe, joined with `separator`.
pub fn key_hash(
    columns: &[String],
    separator: &str,
    qualifier: Option<&str>,
) -> Result<Expr, SurrogateError> {
    let components = columns
        .iter()
        .map(|name| Component {
            sort_name: name.clone(),
            expr: column_expr(name, qualifier),
        })
        .collect();
    hash_components(components, separator)
}

/// Hash of `(name, expr)` pairs sorted by name. Loads use this when the
/// hashed values are read from upstream columns named differently.
pub fn hash_named(
    components: Vec<(String, Expr)>,
    separator: &str,
) -> Result<Expr, SurrogateError> {
    hash_components(
        components
            .into_iter()
            .map(|(sort_name, expr)| Component { sort_name, expr })
            .collect(),
        separator,
    )
}

/// Surrogate key over a dataset's natural key columns.
pub fn surrogate_key(
    natural_keys: &[String],
    qualifier: Option<&str>,
) -> Result<Expr, SurrogateError> {
    key_hash(natural_keys, DEFAULT_SEPARATOR, qualifier)
}

/// History-row key: the natural keys plus `version_started_at`, where the
/// latter is the run's load timestamp rather than a stored column.
pub fn history_key(
    natural_keys: &[String],
    qualifier: Option<&str>,
) -> Result<Expr, SurrogateError> {
    let mut components: Vec<Component> = natural_keys
        .iter()
        .filter(|name| name.as_str() != VERSION_STARTED_AT)
        .map(|name| Component {
            sort_name: name.clone(),
            expr: column_expr(name, qualifier),
        })
        .collect();
    if components.is_empty() {
        return Err(SurrogateError::NoColumns);
    }
    components.push(Component {
        sort_name: VERSION_STARTED_AT.to_string(),
        expr: placeholder(Placeholder::LoadTimestamp),
    });
    hash_components(components, DEFAULT_SEPARATOR)
}
