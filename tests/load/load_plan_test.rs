#[path = "../common/mod.rs"]
mod common;

use chrono::NaiveDate;
use common::{customer_catalog, CUSTOMER_CATALOG};
use strata::load::{
    check_capabilities, compose_load_sql, create_table_sql, resolve_load_plan, LoadError,
    LoadMode, LoadOptions,
};
use strata::metadata::{Catalog, DatasetKey};
use strata::sql::template::{substitute, RuntimeValues};
use strata::sql::{to_script, Dialect};

#[test]
fn test_plans_follow_metadata() {
    let catalog = customer_catalog();
    let plans: Vec<(String, LoadMode, bool, bool)> = catalog
        .datasets()
        .filter(|d| d.schema == "rawcore")
        .map(|d| {
            let plan = resolve_load_plan(&catalog, d).unwrap();
            (d.key().to_string(), plan.mode, plan.handle_deletes, plan.historize)
        })
        .collect();
    assert_eq!(
        plans,
        vec![
            ("rawcore.rc_customer".to_string(), LoadMode::Merge, true, true),
            ("rawcore.rc_customer_hist".to_string(), LoadMode::Historize, false, false),
        ]
    );
}

#[test]
fn test_merge_without_natural_keys_fails_before_sql() {
    let json = CUSTOMER_CATALOG.replace(r#""natural_key_fields": ["customer_id"],"#, "");
    let json = json.replace(r#""historize": true,"#, "");
    let catalog = Catalog::from_json(&json).unwrap();
    let err = compose_load_sql(
        &catalog,
        &DatasetKey::new("rawcore", "rc_customer"),
        Dialect::Postgres,
        &LoadOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::MissingNaturalKeys(_)));
    assert!(!err.is_retriable());
}

#[test]
fn test_compiled_script_resolves_placeholders() {
    let catalog = customer_catalog();
    let load = compose_load_sql(
        &catalog,
        &DatasetKey::new("rawcore", "rc_customer"),
        Dialect::Postgres,
        &LoadOptions::default(),
    )
    .unwrap();
    check_capabilities(&load.plan, Dialect::Postgres).unwrap();

    let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(12, 30, 0)
        .unwrap();
    let values = RuntimeValues {
        load_run_id: "run-1".into(),
        load_timestamp: ts,
        delta_cutoff: Some(ts),
    };
    let script = substitute(&to_script(&load.statements), Dialect::Postgres, &values).unwrap();
    assert!(!script.contains("{{"));
    assert!(script.contains("ModifiedAt >= CAST('2024-03-01 12:30:00' AS TIMESTAMP)"));
    // The delete scan filters on the target's own column.
    assert!(script.contains("(modified_at >= CAST('2024-03-01 12:30:00' AS TIMESTAMP))"));
}

#[test]
fn test_create_table_for_new_dataset() {
    let catalog = customer_catalog();
    let rc = catalog.get_by_name("rawcore.rc_customer").unwrap();
    let sql = create_table_sql(rc, Dialect::TSql).unwrap();
    assert!(sql.contains("CREATE TABLE [rawcore].[rc_customer]"));
    assert!(sql.contains("[customer_id] BIGINT"));
}
