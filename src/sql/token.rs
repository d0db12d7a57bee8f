//! SQL tokens - the atomic units of rendered SQL.
//!
//! Tokens are dialect-agnostic; they only become text when serialized
//! against a [`Dialect`]. Anything built from tokens therefore renders the
//! same logical statement for every warehouse.

use super::dialect::{Dialect, SqlDialect};
use super::template::Placeholder;

/// Every element that can appear in generated SQL.
///
/// Adding a variant forces every `serialize` arm to handle it.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Query keywords ===
    Select,
    Distinct,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    On,
    Join,
    Inner,
    Left,
    GroupBy,
    OrderBy,
    Asc,
    Desc,
    Union,
    All,
    Null,
    Is,
    In,
    Exists,
    Case,
    When,
    Then,
    Else,
    End,
    Over,
    PartitionBy,
    Cast,

    // === DDL keywords ===
    Create,
    Alter,
    Table,
    Column,
    Schema,
    Add,
    If,
    Rename,
    To,
    View,
    Replace,
    Truncate,

    // === DML keywords ===
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Using,
    Merge,
    Matched,

    // === Punctuation ===
    Comma,
    Dot,
    Star,
    LParen,
    RParen,
    Semicolon,

    // === Operators ===
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Concat,

    // === Whitespace ===
    Space,
    Newline,
    Indent(usize),

    // === Dynamic content ===
    /// Table, column or alias name.
    Ident(String),
    /// `schema.name` or bare `name`.
    QualifiedIdent {
        schema: Option<String>,
        name: String,
    },
    LitInt(i64),
    /// Float literal. Callers must reject non-finite values before
    /// producing this token.
    LitFloat(f64),
    LitString(String),
    LitBool(bool),
    LitNull,
    /// Function name, remapped per dialect and upper-cased.
    FunctionName(String),
    /// Runtime placeholder. Always serialized verbatim so the final
    /// substitution pass can find it.
    Placeholder(Placeholder),

    /// Pre-rendered SQL passed through untouched.
    ///
    /// Never feed user input through this variant: nothing is escaped.
    Raw(String),
}

impl Token {
    /// Serialize this token for the given dialect.
    pub fn serialize(&self, dialect: Dialect) -> String {
        match self {
            Token::Select => "SELECT".into(),
            Token::Distinct => "DISTINCT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::Not => "NOT".into(),
            Token::As => "AS".into(),
            Token::On => "ON".into(),
            Token::Join => "JOIN".into(),
            Token::Inner => "INNER".into(),
            Token::Left => "LEFT".into(),
            Token::GroupBy => "GROUP BY".into(),
            Token::OrderBy => "ORDER BY".into(),
            Token::Asc => "ASC".into(),
            Token::Desc => "DESC".into(),
            Token::Union => "UNION".into(),
            Token::All => "ALL".into(),
            Token::Null => dialect.format_null().into(),
            Token::Is => "IS".into(),
            Token::In => "IN".into(),
            Token::Exists => "EXISTS".into(),
            Token::Case => "CASE".into(),
            Token::When => "WHEN".into(),
            Token::Then => "THEN".into(),
            Token::Else => "ELSE".into(),
            Token::End => "END".into(),
            Token::Over => "OVER".into(),
            Token::PartitionBy => "PARTITION BY".into(),
            Token::Cast => "CAST".into(),

            Token::Create => "CREATE".into(),
            Token::Alter => "ALTER".into(),
            Token::Table => "TABLE".into(),
            Token::Column => "COLUMN".into(),
            Token::Schema => "SCHEMA".into(),
            Token::Add => "ADD".into(),
            Token::If => "IF".into(),
            Token::Rename => "RENAME".into(),
            Token::To => "TO".into(),
            Token::View => "VIEW".into(),
            Token::Replace => "REPLACE".into(),
            Token::Truncate => "TRUNCATE".into(),

            Token::Insert => "INSERT".into(),
            Token::Into => "INTO".into(),
            Token::Values => "VALUES".into(),
            Token::Update => "UPDATE".into(),
            Token::Set => "SET".into(),
            Token::Delete => "DELETE".into(),
            Token::Using => "USING".into(),
            Token::Merge => "MERGE".into(),
            Token::Matched => "MATCHED".into(),

            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::Star => "*".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Semicolon => ";".into(),

            Token::Eq => "=".into(),
            Token::Ne => "<>".into(),
            Token::Lt => "<".into(),
            Token::Gt => ">".into(),
            Token::Lte => "<=".into(),
            Token::Gte => ">=".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Concat => dialect.concat_operator().into(),

            Token::Space => " ".into(),
            Token::Newline => "\n".into(),
            Token::Indent(n) => "    ".repeat(*n),

            Token::Ident(name) => dialect.quote_identifier(name),
            Token::QualifiedIdent { schema, name } => match schema {
                Some(s) => format!(
                    "{}.{}",
                    dialect.quote_identifier(s),
                    dialect.quote_identifier(name)
                ),
                None => dialect.quote_identifier(name),
            },
            Token::LitInt(n) => n.to_string(),
            Token::LitFloat(f) => {
                let mut buffer = ryu::Buffer::new();
                buffer.format(*f).to_string()
            }
            Token::LitString(s) => dialect.quote_string(s),
            Token::LitBool(b) => dialect.format_bool(*b).into(),
            Token::LitNull => dialect.format_null().into(),
            Token::FunctionName(name) => match dialect.remap_function(name) {
                Some(remapped) => remapped.to_uppercase(),
                None => name.to_uppercase(),
            },
            Token::Placeholder(p) => p.marker().into(),
            Token::Raw(s) => s.clone(),
        }
    }
}

/// An ordered run of tokens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    pub fn extend(&mut self, tokens: impl IntoIterator<Item = Token>) -> &mut Self {
        self.tokens.extend(tokens);
        self
    }

    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Serialize all tokens to SQL text.
    pub fn serialize(&self, dialect: Dialect) -> String {
        self.tokens.iter().map(|t| t.serialize(dialect)).collect()
    }

    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn indent(&mut self, n: usize) -> &mut Self {
        self.push(Token::Indent(n))
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }

    /// Push `items` separated by `", "`.
    pub fn comma_separated<I>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = TokenStream>,
    {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.comma().space();
            }
            self.append(&item);
        }
        self
    }
}

impl From<Token> for TokenStream {
    fn from(token: Token) -> Self {
        Self {
            tokens: vec![token],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_serialize() {
        assert_eq!(Token::Select.serialize(Dialect::DuckDb), "SELECT");
        assert_eq!(Token::PartitionBy.serialize(Dialect::TSql), "PARTITION BY");
    }

    #[test]
    fn test_ident_serialize() {
        let tok = Token::Ident("customer".into());
        assert_eq!(tok.serialize(Dialect::Postgres), "\"customer\"");
        assert_eq!(tok.serialize(Dialect::TSql), "[customer]");
        assert_eq!(tok.serialize(Dialect::BigQuery), "`customer`");
    }

    #[test]
    fn test_qualified_ident() {
        let tok = Token::QualifiedIdent {
            schema: Some("rawcore".into()),
            name: "rc_customer".into(),
        };
        assert_eq!(tok.serialize(Dialect::Fabric), "[rawcore].[rc_customer]");
        assert_eq!(tok.serialize(Dialect::Oracle), "\"rawcore\".\"rc_customer\"");
    }

    #[test]
    fn test_placeholder_survives_every_dialect() {
        for dialect in Dialect::ALL {
            assert_eq!(
                Token::Placeholder(Placeholder::DeltaCutoff).serialize(dialect),
                "{{DELTA_CUTOFF}}"
            );
            assert_eq!(
                Token::Placeholder(Placeholder::LoadRunId).serialize(dialect),
                "{{ load_run_id }}"
            );
        }
    }

    #[test]
    fn test_comma_separated() {
        let mut ts = TokenStream::new();
        ts.comma_separated(vec![
            Token::Ident("a".into()).into(),
            Token::Ident("b".into()).into(),
        ]);
        assert_eq!(ts.serialize(Dialect::Postgres), "\"a\", \"b\"");
    }

    #[test]
    fn test_concat_dialect() {
        assert_eq!(Token::Concat.serialize(Dialect::DuckDb), "||");
        assert_eq!(Token::Concat.serialize(Dialect::TSql), "+");
    }

    #[test]
    fn test_float_serialize() {
        assert_eq!(Token::LitFloat(3.5).serialize(Dialect::DuckDb), "3.5");
        assert_eq!(Token::LitFloat(1.0).serialize(Dialect::DuckDb), "1.0");
        assert_eq!(Token::LitFloat(-42.25).serialize(Dialect::Snowflake), "-42.25");
    }
}
