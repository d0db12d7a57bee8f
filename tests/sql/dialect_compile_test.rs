#[path = "../common/mod.rs"]
mod common;

use common::customer_catalog;
use insta::assert_snapshot;
use strata::load::{compose_load_sql, LoadOptions};
use strata::metadata::DatasetKey;
use strata::sql::ddl::{self, ColumnSpec};
use strata::sql::surrogate;
use strata::sql::template::{placeholders_in, Placeholder};
use strata::sql::{DataType, Dialect, SqlDialect};

fn rc_customer() -> DatasetKey {
    DatasetKey::new("rawcore", "rc_customer")
}

#[test]
fn test_merge_compiles_for_every_dialect() {
    let catalog = customer_catalog();
    for dialect in Dialect::ALL {
        let load = compose_load_sql(&catalog, &rc_customer(), dialect, &LoadOptions::default())
            .unwrap_or_else(|e| panic!("{}: {}", dialect, e));
        let script = load.statements.join("\n");

        if dialect.supports_merge() {
            assert!(
                load.statements[0].starts_with("MERGE INTO"),
                "{} should use native MERGE",
                dialect
            );
        } else {
            assert!(
                load.statements.iter().any(|s| s.starts_with("UPDATE")),
                "{} fallback should update matched rows",
                dialect
            );
            assert!(script.contains("NOT EXISTS"), "{} fallback should insert new rows", dialect);
        }

        // Delete detection runs last.
        let last = load.statements.last().unwrap();
        assert!(last.starts_with("DELETE FROM"), "{}: {}", dialect, last);

        let placeholders = placeholders_in(&script).unwrap();
        assert!(placeholders.contains(&Placeholder::DeltaCutoff), "{}", dialect);
    }
}

#[test]
fn test_history_compiles_for_every_dialect() {
    let catalog = customer_catalog();
    let hist = DatasetKey::new("rawcore", "rc_customer_hist");
    for dialect in Dialect::ALL {
        let load = compose_load_sql(&catalog, &hist, dialect, &LoadOptions::default())
            .unwrap_or_else(|e| panic!("{}: {}", dialect, e));
        assert_eq!(load.statements.len(), 4, "{}", dialect);
        assert!(load.statements[0].starts_with("UPDATE"), "{}", dialect);
        assert!(load.statements[2].starts_with("INSERT INTO"), "{}", dialect);
        assert!(load.statements[3].starts_with("INSERT INTO"), "{}", dialect);
    }
}

#[test]
fn test_identifier_quoting_per_dialect() {
    let catalog = customer_catalog();
    let first = |dialect| {
        compose_load_sql(&catalog, &rc_customer(), dialect, &LoadOptions::default())
            .unwrap()
            .statements
            .join("\n")
    };
    assert!(first(Dialect::TSql).contains("[rawcore].[rc_customer]"));
    assert!(first(Dialect::MySql).contains("`rawcore`.`rc_customer`"));
    assert!(first(Dialect::BigQuery).contains("`rawcore`.`rc_customer`"));
    assert!(first(Dialect::Postgres).contains("\"rawcore\".\"rc_customer\""));
}

#[test]
fn test_surrogate_key_is_order_independent() {
    let a = surrogate::parse(r#"concat(col("region"), '|', col("customer_id"))"#).unwrap();
    let b = surrogate::parse(r#"concat(col("customer_id"), '|', col("region"))"#).unwrap();
    for dialect in Dialect::ALL {
        let left = a.to_hash_expr(Some("src")).unwrap().to_sql(dialect).unwrap();
        let right = b.to_hash_expr(Some("src")).unwrap().to_sql(dialect).unwrap();
        assert_eq!(left, right, "{}", dialect);
        assert!(left.contains("^^NULL^^"), "{}", dialect);
    }
}

#[test]
fn test_surrogate_key_postgres() {
    let sql = surrogate::surrogate_key(&["customer_id".into()], Some("src"))
        .unwrap()
        .to_sql(Dialect::Postgres)
        .unwrap();
    assert_snapshot!(sql, @r#"ENCODE(SHA256(CONVERT_TO(COALESCE(CAST("src"."customer_id" AS TEXT), '^^NULL^^'), 'UTF8')), 'hex')"#);
}

#[test]
fn test_ddl_snapshots() {
    let columns = vec![
        ColumnSpec::new("customer_id", DataType::Int64).not_null(),
        ColumnSpec::new("name", DataType::Varchar(200)),
    ];
    let sql = ddl::create_table(Dialect::Postgres, Some("rawcore"), "rc_customer", &columns).unwrap();
    assert_snapshot!(sql, @r#"
    CREATE TABLE IF NOT EXISTS "rawcore"."rc_customer" (
        "customer_id" BIGINT NOT NULL,
        "name" VARCHAR(200)
    )
    "#);

    let sql = ddl::rename_column(Dialect::DuckDb, Some("s"), "t", "old_col", "new_col").unwrap();
    assert_snapshot!(sql, @r#"ALTER TABLE "s"."t" RENAME COLUMN "old_col" TO "new_col""#);
}

#[test]
fn test_create_schema_capability() {
    for dialect in Dialect::ALL {
        let sql = ddl::create_schema(dialect, "rawcore");
        assert_eq!(sql.is_ok(), dialect.emit_create_schema("rawcore").is_some(), "{}", dialect);
    }
    assert!(ddl::create_schema(Dialect::Oracle, "rawcore").is_err());
}
