//! Logical column types.
//!
//! Declared metadata and introspected physical columns both arrive as
//! free-form type strings. [`DataType::parse`] folds the vendor spellings
//! into one enum so declared and live types can be compared, and each
//! dialect maps the enum back to its own DDL spelling.

use std::fmt;

/// A column type independent of any warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    /// TINYINT.
    Int8,
    /// SMALLINT.
    Int16,
    /// INT / INTEGER.
    Int32,
    /// BIGINT.
    Int64,
    Float32,
    Float64,
    /// Precision, scale.
    Decimal(u8, u8),
    /// Unbounded text.
    String,
    Char(u16),
    Varchar(u16),
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Binary,
    Json,
    Uuid,
}

impl DataType {
    /// Parse a type name as written by users or returned by catalog views.
    ///
    /// Case and surrounding whitespace are ignored. Precision suffixes on
    /// temporal types (`datetime2(7)`, `timestamp(6)`) are accepted and
    /// dropped. Returns `None` for anything unrecognised.
    ///
    /// ```ignore
    /// use strata::sql::types::DataType;
    ///
    /// assert_eq!(DataType::parse("NUMBER(10,2)"), Some(DataType::Decimal(10, 2)));
    /// assert_eq!(DataType::parse("varchar2(40)"), Some(DataType::Varchar(40)));
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        let s = s.split_whitespace().collect::<Vec<_>>().join(" ");

        if let Some((base, args)) = split_params(&s) {
            return parse_parameterized(base, args);
        }

        match s.as_str() {
            "bool" | "boolean" | "bit" => Some(DataType::Bool),

            "tinyint" | "byteint" => Some(DataType::Int8),
            "smallint" | "int2" | "int16" => Some(DataType::Int16),
            "int" | "integer" | "int4" | "int32" | "mediumint" => Some(DataType::Int32),
            "bigint" | "int8" | "int64" => Some(DataType::Int64),

            "real" | "float4" | "float32" => Some(DataType::Float32),
            "double" | "double precision" | "float" | "float8" | "float64"
            | "binary_double" => Some(DataType::Float64),

            "decimal" | "numeric" | "number" | "bignumeric" => Some(DataType::Decimal(38, 0)),
            "money" => Some(DataType::Decimal(19, 4)),

            "text" | "string" | "clob" | "nclob" | "ntext" | "longtext" | "mediumtext"
            | "varchar" | "nvarchar" | "varchar2" | "nvarchar2" | "character varying" => {
                Some(DataType::String)
            }
            "char" | "nchar" | "character" => Some(DataType::Char(1)),

            "date" => Some(DataType::Date),
            "time" => Some(DataType::Time),
            "timestamp" | "timestamp_ntz" | "timestamp without time zone" | "datetime"
            | "datetime2" | "smalldatetime" => Some(DataType::Timestamp),
            "timestamptz" | "timestamp_tz" | "timestamp_ltz" | "timestamp with time zone"
            | "datetimeoffset" => Some(DataType::TimestampTz),

            "binary" | "varbinary" | "blob" | "bytea" | "bytes" | "image" | "raw" => {
                Some(DataType::Binary)
            }
            "json" | "jsonb" | "variant" => Some(DataType::Json),
            "uuid" | "uniqueidentifier" => Some(DataType::Uuid),

            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self,
                DataType::Float32 | DataType::Float64 | DataType::Decimal(_, _)
            )
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self,
            DataType::String | DataType::Char(_) | DataType::Varchar(_)
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            DataType::Date | DataType::Time | DataType::Timestamp | DataType::TimestampTz
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "BOOLEAN"),
            DataType::Int8 => write!(f, "TINYINT"),
            DataType::Int16 => write!(f, "SMALLINT"),
            DataType::Int32 => write!(f, "INTEGER"),
            DataType::Int64 => write!(f, "BIGINT"),
            DataType::Float32 => write!(f, "REAL"),
            DataType::Float64 => write!(f, "DOUBLE PRECISION"),
            DataType::Decimal(p, s) => write!(f, "DECIMAL({}, {})", p, s),
            DataType::String => write!(f, "TEXT"),
            DataType::Char(n) => write!(f, "CHAR({})", n),
            DataType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DataType::Date => write!(f, "DATE"),
            DataType::Time => write!(f, "TIME"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::TimestampTz => write!(f, "TIMESTAMP WITH TIME ZONE"),
            DataType::Binary => write!(f, "BINARY"),
            DataType::Json => write!(f, "JSON"),
            DataType::Uuid => write!(f, "UUID"),
        }
    }
}

/// `"decimal(10, 2)"` -> `("decimal", "10, 2")`.
fn split_params(s: &str) -> Option<(&str, &str)> {
    let open = s.find('(')?;
    let inner = s.strip_suffix(')')?.get(open + 1..)?;
    Some((s[..open].trim(), inner.trim()))
}

fn parse_parameterized(base: &str, args: &str) -> Option<DataType> {
    let nums: Vec<&str> = args.split(',').map(str::trim).collect();

    match base {
        "decimal" | "numeric" | "number" | "bignumeric" => match nums.as_slice() {
            [p] => Some(DataType::Decimal(p.parse().ok()?, 0)),
            [p, s] => Some(DataType::Decimal(p.parse().ok()?, s.parse().ok()?)),
            _ => None,
        },
        "varchar" | "nvarchar" | "varchar2" | "nvarchar2" | "character varying" | "string" => {
            match nums.as_slice() {
                [n] if n.eq_ignore_ascii_case("max") => Some(DataType::String),
                [n] => Some(DataType::Varchar(length(n)?)),
                _ => None,
            }
        }
        "char" | "nchar" | "character" => match nums.as_slice() {
            [n] => Some(DataType::Char(length(n)?)),
            _ => None,
        },
        "varbinary" | "binary" | "raw" => Some(DataType::Binary),
        "float" => match nums.as_slice() {
            [n] => match n.parse::<u8>().ok()? {
                0..=24 => Some(DataType::Float32),
                _ => Some(DataType::Float64),
            },
            _ => None,
        },
        "tinyint" if args == "1" => Some(DataType::Bool),
        // Display widths and fractional-second precision carry no type meaning.
        "tinyint" | "smallint" | "int" | "integer" | "bigint" | "time" | "timestamp"
        | "datetime" | "datetime2" | "timestamp_ntz" | "datetimeoffset" | "timestamp_tz"
        | "timestamp_ltz" => DataType::parse(base),
        _ => None,
    }
}

fn length(n: &str) -> Option<u16> {
    n.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        assert_eq!(DataType::parse("BOOLEAN"), Some(DataType::Bool));
        assert_eq!(DataType::parse("bit"), Some(DataType::Bool));
        assert_eq!(DataType::parse("integer"), Some(DataType::Int32));
        assert_eq!(DataType::parse("int64"), Some(DataType::Int64));
        assert_eq!(DataType::parse("double precision"), Some(DataType::Float64));
        assert_eq!(DataType::parse("text"), Some(DataType::String));
        assert_eq!(DataType::parse("  Date "), Some(DataType::Date));
        assert_eq!(DataType::parse("uniqueidentifier"), Some(DataType::Uuid));
        assert_eq!(DataType::parse("variant"), Some(DataType::Json));
    }

    #[test]
    fn test_parse_parameterized() {
        assert_eq!(DataType::parse("decimal(10,2)"), Some(DataType::Decimal(10, 2)));
        assert_eq!(DataType::parse("NUMBER(38, 0)"), Some(DataType::Decimal(38, 0)));
        assert_eq!(DataType::parse("numeric(12)"), Some(DataType::Decimal(12, 0)));
        assert_eq!(DataType::parse("varchar(255)"), Some(DataType::Varchar(255)));
        assert_eq!(DataType::parse("VARCHAR2(40 CHAR)"), Some(DataType::Varchar(40)));
        assert_eq!(DataType::parse("nvarchar(max)"), Some(DataType::String));
        assert_eq!(DataType::parse("char(2)"), Some(DataType::Char(2)));
        assert_eq!(DataType::parse("tinyint(1)"), Some(DataType::Bool));
        assert_eq!(DataType::parse("float(53)"), Some(DataType::Float64));
    }

    #[test]
    fn test_parse_temporal_variants() {
        assert_eq!(DataType::parse("datetime2(7)"), Some(DataType::Timestamp));
        assert_eq!(DataType::parse("timestamp(6)"), Some(DataType::Timestamp));
        assert_eq!(DataType::parse("TIMESTAMP_NTZ"), Some(DataType::Timestamp));
        assert_eq!(
            DataType::parse("timestamp with time zone"),
            Some(DataType::TimestampTz)
        );
        assert_eq!(DataType::parse("datetimeoffset"), Some(DataType::TimestampTz));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(DataType::parse(""), None);
        assert_eq!(DataType::parse("geography"), None);
        assert_eq!(DataType::parse("decimal(a,b)"), None);
        assert_eq!(DataType::parse("varchar()"), None);
    }

    #[test]
    fn test_predicates() {
        assert!(DataType::Int16.is_integer());
        assert!(DataType::Decimal(18, 2).is_numeric());
        assert!(!DataType::Decimal(18, 2).is_integer());
        assert!(DataType::Varchar(10).is_string());
        assert!(DataType::TimestampTz.is_temporal());
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::Decimal(18, 2).to_string(), "DECIMAL(18, 2)");
        assert_eq!(DataType::Varchar(64).to_string(), "VARCHAR(64)");
    }
}
