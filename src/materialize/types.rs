//! Type comparison between declared and live columns.

use crate::sql::{DataType, Dialect, SqlDialect};

/// Outcome of comparing a declared type against the live one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeComparison {
    Same,
    /// Different spelling, same storage for this vendor.
    Benign,
    Drift { declared: DataType, live: DataType },
    /// At least one side could not be parsed.
    Unknown,
}

/// Compare `declared` with `live` as `dialect` stores them.
pub fn compare_types(dialect: Dialect, declared: &str, live: &str) -> TypeComparison {
    let (Some(declared), Some(live)) = (DataType::parse(declared), DataType::parse(live)) else {
        return TypeComparison::Unknown;
    };
    if declared == live {
        return TypeComparison::Same;
    }
    if is_benign(dialect, &declared, &live) {
        return TypeComparison::Benign;
    }
    TypeComparison::Drift { declared, live }
}

/// Known equivalences that never warrant a warning.
pub fn is_benign(dialect: Dialect, declared: &DataType, live: &DataType) -> bool {
    use DataType::*;

    // Vendors collapsing several logical types onto one physical type.
    if dialect.emit_data_type(declared) == dialect.emit_data_type(live) {
        return true;
    }

    match (declared, live) {
        (Timestamp, TimestampTz) | (TimestampTz, Timestamp) => true,
        // Unbounded and bounded strings are interchangeable for loads.
        (String, Varchar(_)) | (Varchar(_), String) => true,
        (Varchar(want), Varchar(have)) => have >= want,
        // Oracle DATE carries a time part.
        (Timestamp, Date) => dialect == Dialect::Oracle,
        (d, l) if d.is_integer() && l.is_integer() => integer_width(l) >= integer_width(d),
        _ => false,
    }
}

fn integer_width(dt: &DataType) -> u8 {
    match dt {
        DataType::Int8 => 1,
        DataType::Int16 => 2,
        DataType::Int32 => 4,
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_and_drift() {
        assert_eq!(compare_types(Dialect::Postgres, "bigint", "INT8"), TypeComparison::Same);
        assert_eq!(
            compare_types(Dialect::Postgres, "int", "text"),
            TypeComparison::Drift {
                declared: DataType::Int32,
                live: DataType::String
            }
        );
        assert_eq!(compare_types(Dialect::Postgres, "geography", "text"), TypeComparison::Unknown);
    }

    #[test]
    fn test_benign_equivalences() {
        assert_eq!(
            compare_types(Dialect::Snowflake, "timestamp", "timestamp_tz"),
            TypeComparison::Benign
        );
        assert_eq!(
            compare_types(Dialect::Postgres, "varchar", "varchar(200)"),
            TypeComparison::Benign
        );
        assert_eq!(
            compare_types(Dialect::Postgres, "varchar(50)", "varchar(200)"),
            TypeComparison::Benign
        );
        assert_eq!(compare_types(Dialect::DuckDb, "int", "bigint"), TypeComparison::Benign);
    }

    #[test]
    fn test_narrowing_is_drift() {
        assert!(matches!(
            compare_types(Dialect::Postgres, "varchar(200)", "varchar(50)"),
            TypeComparison::Drift { .. }
        ));
        assert!(matches!(
            compare_types(Dialect::Postgres, "bigint", "smallint"),
            TypeComparison::Drift { .. }
        ));
    }

    #[test]
    fn test_vendor_specific() {
        assert_eq!(compare_types(Dialect::Oracle, "timestamp", "date"), TypeComparison::Benign);
        assert!(matches!(
            compare_types(Dialect::Postgres, "timestamp", "date"),
            TypeComparison::Drift { .. }
        ));
        // BigQuery stores every integer as INT64
        assert_eq!(compare_types(Dialect::BigQuery, "bigint", "int"), TypeComparison::Benign);
    }
}
