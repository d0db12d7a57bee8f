//! Expression AST - the core of SQL expression building.
//!
//! Expressions are a closed set of variants rendered by one recursive walk.
//! Rendering is fallible: a construct the target dialect cannot express
//! fails with [`SqlError::UnsupportedConstruct`] instead of being
//! approximated.

use super::dialect::{Dialect, SqlDialect};
use super::query::QueryPlan;
use super::template::{format_ts, Placeholder};
use super::token::{Token, TokenStream};
use super::types::DataType;
use super::{SqlError, SqlResult};
use chrono::{NaiveDate, NaiveDateTime};

// =============================================================================
// Expression AST
// =============================================================================

/// A SQL expression.
///
/// Every variant must be handled in `to_tokens()` - the compiler enforces this.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference: `[qualifier.]name`.
    Column {
        table: Option<ObjectName>,
        name: String,
    },

    Literal(Literal),

    /// `CAST(expr AS type)`
    Cast {
        expr: Box<Expr>,
        data_type: DataType,
    },

    /// String concatenation. Rendered with the dialect operator, or
    /// `CONCAT(...)` where the operator is unavailable.
    Concat(Vec<Expr>),

    Coalesce(Vec<Expr>),

    /// Function call: name(args...). The name is remapped per dialect.
    Function { name: String, args: Vec<Expr> },

    /// Lower-case hex SHA-256 of a string expression.
    Hash256(Box<Expr>),

    /// `ROW_NUMBER() OVER (PARTITION BY ... ORDER BY ...)`
    RowNumber {
        partition_by: Vec<Expr>,
        order_by: Vec<SortKey>,
    },

    /// Binary operation: left op right
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    Not(Box<Expr>),

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// `[NOT] EXISTS (subquery)`
    Exists {
        query: Box<QueryPlan>,
        negated: bool,
    },

    /// Wildcard: * or alias.*
    Star { table: Option<String> },

    /// Runtime value, serialized as its marker until substitution.
    Placeholder(Placeholder),

    /// Raw SQL passed directly to output without escaping.
    ///
    /// **Never pass user input to this variant.** Use it for trusted
    /// fragments only, such as incremental filters authored in metadata.
    Raw(String),
}

/// `schema.name` or bare `name`, used as a column qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectName {
    pub schema: Option<String>,
    pub name: String,
}

impl ObjectName {
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// A bare alias such as `src`.
    pub fn alias(alias: &str) -> Self {
        Self::new(None, alias)
    }

    pub fn to_token(&self) -> Token {
        Token::QualifiedIdent {
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact numeric kept as text, e.g. `"12.50"`.
    Decimal(String),
    String(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
}

impl BinaryOperator {
    fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    fn token(&self) -> Token {
        match self {
            BinaryOperator::Eq => Token::Eq,
            BinaryOperator::Ne => Token::Ne,
            BinaryOperator::Lt => Token::Lt,
            BinaryOperator::Gt => Token::Gt,
            BinaryOperator::Lte => Token::Lte,
            BinaryOperator::Gte => Token::Gte,
            BinaryOperator::And => Token::And,
            BinaryOperator::Or => Token::Or,
        }
    }
}

/// ORDER BY entry inside a window.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
        }
    }
}

// =============================================================================
// Rendering
// =============================================================================

impl Expr {
    /// Convert this expression to a token stream for a specific dialect.
    pub fn to_tokens(&self, dialect: Dialect) -> SqlResult<TokenStream> {
        let mut ts = TokenStream::new();

        match self {
            Expr::Column { table, name } => {
                if let Some(t) = table {
                    ts.push(t.to_token()).push(Token::Dot);
                }
                ts.push(Token::Ident(name.clone()));
            }

            Expr::Literal(lit) => {
                ts.push(literal_token(dialect, lit)?);
            }

            Expr::Cast { expr, data_type } => {
                ts.push(Token::Cast)
                    .lparen()
                    .append(&expr.to_tokens(dialect)?)
                    .space()
                    .push(Token::As)
                    .space()
                    .push(Token::Raw(dialect.cast_target(data_type)))
                    .rparen();
            }

            Expr::Concat(parts) => match parts.as_slice() {
                [] => {
                    ts.push(Token::LitString(String::new()));
                }
                [single] => {
                    ts.append(&single.to_tokens(dialect)?);
                }
                _ if !dialect.supports_concat_operator() => {
                    ts.push(Token::FunctionName("CONCAT".into()))
                        .lparen()
                        .comma_separated(render_all(parts, dialect)?)
                        .rparen();
                }
                _ => {
                    for (i, part) in parts.iter().enumerate() {
                        if i > 0 {
                            ts.space().push(Token::Concat).space();
                        }
                        ts.append(&part.to_tokens(dialect)?);
                    }
                }
            },

            Expr::Coalesce(args) => {
                if args.is_empty() {
                    return Err(SqlError::EmptyExpression("COALESCE"));
                }
                ts.push(Token::FunctionName("COALESCE".into()))
                    .lparen()
                    .comma_separated(render_all(args, dialect)?)
                    .rparen();
            }

            Expr::Function { name, args } => {
                ts.push(Token::FunctionName(name.clone()))
                    .lparen()
                    .comma_separated(render_all(args, dialect)?)
                    .rparen();
            }

            Expr::Hash256(input) => {
                ts.append(&dialect.emit_hash256(input.to_tokens(dialect)?));
            }

            Expr::RowNumber {
                partition_by,
                order_by,
            } => {
                if order_by.is_empty() && dialect.row_number_requires_order_by() {
                    return Err(SqlError::UnsupportedConstruct {
                        dialect,
                        construct: "ROW_NUMBER() without ORDER BY".into(),
                    });
                }
                ts.push(Token::FunctionName("ROW_NUMBER".into()))
                    .lparen()
                    .rparen()
                    .space()
                    .push(Token::Over)
                    .space()
                    .lparen();
                if !partition_by.is_empty() {
                    ts.push(Token::PartitionBy)
                        .space()
                        .comma_separated(render_all(partition_by, dialect)?);
                }
                if !order_by.is_empty() {
                    if !partition_by.is_empty() {
                        ts.space();
                    }
                    let keys = order_by
                        .iter()
                        .map(|key| {
                            let mut k = key.expr.to_tokens(dialect)?;
                            k.space()
                                .push(if key.descending { Token::Desc } else { Token::Asc });
                            Ok(k)
                        })
                        .collect::<SqlResult<Vec<_>>>()?;
                    ts.push(Token::OrderBy).space().comma_separated(keys);
                }
                ts.rparen();
            }

            Expr::BinaryOp { left, op, right } => {
                ts.append(&operand_tokens(left, *op, dialect)?)
                    .space()
                    .push(op.token())
                    .space()
                    .append(&operand_tokens(right, *op, dialect)?);
            }

            Expr::Not(inner) => {
                ts.push(Token::Not).space().lparen();
                ts.append(&inner.to_tokens(dialect)?).rparen();
            }

            Expr::IsNull { expr, negated } => {
                ts.append(&expr.to_tokens(dialect)?)
                    .space()
                    .push(Token::Is)
                    .space();
                if *negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::Null);
            }

            Expr::Exists { query, negated } => {
                if *negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::Exists)
                    .space()
                    .lparen()
                    .append(&query.to_tokens(dialect)?)
                    .rparen();
            }

            Expr::Star { table } => {
                if let Some(t) = table {
                    ts.push(Token::Ident(t.clone())).push(Token::Dot);
                }
                ts.push(Token::Star);
            }

            Expr::Placeholder(p) => {
                ts.push(Token::Placeholder(*p));
            }

            Expr::Raw(sql) => {
                ts.push(Token::Raw(sql.clone()));
            }
        }

        Ok(ts)
    }

    /// Render to SQL text.
    pub fn to_sql(&self, dialect: Dialect) -> SqlResult<String> {
        Ok(self.to_tokens(dialect)?.serialize(dialect))
    }
}

fn render_all(exprs: &[Expr], dialect: Dialect) -> SqlResult<Vec<TokenStream>> {
    exprs.iter().map(|e| e.to_tokens(dialect)).collect()
}

/// Parenthesize operands that would otherwise re-associate: mixed AND/OR,
/// and concatenations used as comparison operands.
fn operand_tokens(expr: &Expr, parent: BinaryOperator, dialect: Dialect) -> SqlResult<TokenStream> {
    let needs_parens = match expr {
        Expr::BinaryOp { op, .. } => op.is_logical() && (*op != parent || !parent.is_logical()),
        Expr::Concat(parts) => parts.len() > 1,
        _ => false,
    };
    let inner = expr.to_tokens(dialect)?;
    if !needs_parens {
        return Ok(inner);
    }
    let mut ts = TokenStream::new();
    ts.lparen().append(&inner).rparen();
    Ok(ts)
}

fn literal_token(dialect: Dialect, lit: &Literal) -> SqlResult<Token> {
    Ok(match lit {
        Literal::Null => Token::LitNull,
        Literal::Bool(b) => Token::LitBool(*b),
        Literal::Int(n) => Token::LitInt(*n),
        Literal::Float(f) if !f.is_finite() => {
            return Err(SqlError::UnsupportedConstruct {
                dialect,
                construct: format!("non-finite float literal {}", f),
            })
        }
        Literal::Float(f) => Token::LitFloat(*f),
        Literal::Decimal(d) => {
            if !is_decimal_text(d) {
                return Err(SqlError::InvalidLiteral(d.clone()));
            }
            Token::Raw(d.trim().to_string())
        }
        Literal::String(s) => Token::LitString(s.clone()),
        Literal::Date(d) => Token::Raw(dialect.format_date_literal(&d.format("%Y-%m-%d").to_string())),
        Literal::Timestamp(ts) => Token::Raw(dialect.format_timestamp_literal(&format_ts(ts))),
    })
}

/// `-12.50`, `3`, `.5`; nothing else is emitted unquoted.
fn is_decimal_text(s: &str) -> bool {
    let s = s.trim();
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    let mut parts = digits.splitn(2, '.');
    let int = parts.next().unwrap_or("");
    let frac = parts.next().unwrap_or("");
    (!int.is_empty() || !frac.is_empty())
        && int.chars().all(|c| c.is_ascii_digit())
        && frac.chars().all(|c| c.is_ascii_digit())
}

/// Render a literal; `None` renders as the dialect NULL keyword.
pub fn render_literal(dialect: Dialect, value: Option<&Literal>) -> SqlResult<String> {
    let token = match value {
        Some(lit) => literal_token(dialect, lit)?,
        None => Token::LitNull,
    };
    Ok(token.serialize(dialect))
}

/// Render an expression to SQL text.
pub fn render_expr(dialect: Dialect, expr: &Expr) -> SqlResult<String> {
    expr.to_sql(dialect)
}

// =============================================================================
// Constructors
// =============================================================================

/// Unqualified column reference.
pub fn col(name: &str) -> Expr {
    Expr::Column {
        table: None,
        name: name.to_string(),
    }
}

/// Column qualified by a table alias.
pub fn table_col(alias: &str, name: &str) -> Expr {
    Expr::Column {
        table: Some(ObjectName::alias(alias)),
        name: name.to_string(),
    }
}

/// Column qualified by a schema-qualified table name, for correlating
/// against an UPDATE or DELETE target that cannot carry an alias.
pub fn qualified_col(schema: Option<&str>, table: &str, name: &str) -> Expr {
    Expr::Column {
        table: Some(ObjectName::new(schema, table)),
        name: name.to_string(),
    }
}

pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.to_string()))
}

pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

pub fn lit_bool(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
}

pub fn lit_null() -> Expr {
    Expr::Literal(Literal::Null)
}

pub fn cast(expr: Expr, data_type: DataType) -> Expr {
    Expr::Cast {
        expr: Box::new(expr),
        data_type,
    }
}

pub fn coalesce(args: Vec<Expr>) -> Expr {
    Expr::Coalesce(args)
}

pub fn concat(parts: Vec<Expr>) -> Expr {
    Expr::Concat(parts)
}

pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.to_string(),
        args,
    }
}

pub fn hash256(expr: Expr) -> Expr {
    Expr::Hash256(Box::new(expr))
}

pub fn placeholder(p: Placeholder) -> Expr {
    Expr::Placeholder(p)
}

pub fn raw_sql(sql: &str) -> Expr {
    Expr::Raw(sql.to_string())
}

pub fn row_number_over(partition_by: Vec<Expr>, order_by: Vec<SortKey>) -> Expr {
    Expr::RowNumber {
        partition_by,
        order_by,
    }
}

pub fn exists(query: QueryPlan) -> Expr {
    Expr::Exists {
        query: Box::new(query),
        negated: false,
    }
}

pub fn not_exists(query: QueryPlan) -> Expr {
    Expr::Exists {
        query: Box::new(query),
        negated: true,
    }
}

/// AND together `preds`; `None` when empty.
pub fn and_all(preds: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    preds.into_iter().reduce(|acc, p| acc.and(p))
}

// =============================================================================
// Expression Builder Trait
// =============================================================================

/// Extension trait for building predicates fluently.
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    fn binary(self, op: BinaryOperator, other: impl Into<Expr>) -> Expr {
        Expr::BinaryOp {
            left: Box::new(self.into_expr()),
            op,
            right: Box::new(other.into()),
        }
    }

    fn eq(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Eq, other)
    }

    fn ne(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Ne, other)
    }

    fn gte(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Gte, other)
    }

    fn and(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::And, other)
    }

    fn or(self, other: impl Into<Expr>) -> Expr {
        self.binary(BinaryOperator::Or, other)
    }

    fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: false,
        }
    }

    fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: true,
        }
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl From<Literal> for Expr {
    fn from(lit: Literal) -> Self {
        Expr::Literal(lit)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        lit_str(s)
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}
