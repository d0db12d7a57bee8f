use strata::materialize::{build_plan, LiveColumn, MaterializationPolicy, StaticIntrospector};
use strata::metadata::{Catalog, CatalogDocument, Column, Dataset, Schema};
use strata::sql::Dialect;

fn orders(columns: Vec<Column>) -> Catalog {
    let mut ds = Dataset::new(1, "rawcore", "rc_order");
    ds.columns = columns;
    Catalog::new(CatalogDocument {
        schemas: vec![Schema::new("rawcore")],
        datasets: vec![ds],
        query_nodes: vec![],
    })
    .unwrap()
}

fn renamed_column() -> Column {
    let mut column = Column::new("new_col", "int", 2);
    column.former_names = vec!["old_col".into()];
    column
}

#[test]
fn test_former_name_renames_instead_of_adding() {
    let catalog = orders(vec![Column::new("id", "bigint", 1), renamed_column()]);
    let live = StaticIntrospector::new().with_table(
        "rawcore",
        "rc_order",
        vec![LiveColumn::new("id", "bigint"), LiveColumn::new("old_col", "int")],
    );
    let dataset = catalog.get_by_name("rawcore.rc_order").unwrap();
    let plan = build_plan(dataset, &live, Dialect::DuckDb, &MaterializationPolicy::default()).unwrap();

    assert_eq!(plan.count("RENAME_COLUMN"), 1);
    assert_eq!(plan.count("ADD_COLUMN"), 0);
    assert!(plan.requires_backfill);
    assert_eq!(
        plan.render(Dialect::DuckDb).unwrap(),
        vec!["ALTER TABLE \"rawcore\".\"rc_order\" RENAME COLUMN \"old_col\" TO \"new_col\""]
    );
}

#[test]
fn test_missing_table_plans_no_columns() {
    let catalog = orders(vec![Column::new("id", "bigint", 1), renamed_column()]);
    let live = StaticIntrospector::new().with_schema("rawcore");
    let dataset = catalog.get_by_name("rawcore.rc_order").unwrap();
    let plan = build_plan(dataset, &live, Dialect::DuckDb, &MaterializationPolicy::default()).unwrap();

    assert!(!plan.table_exists);
    assert_eq!(plan.count("ADD_COLUMN"), 0);
    assert!(plan.warnings.iter().any(|w| w.starts_with("MISSING_TABLE")));
}

#[test]
fn test_opaque_table_adds_every_column_with_warning() {
    let catalog = orders(vec![Column::new("id", "bigint", 1), renamed_column()]);
    let live = StaticIntrospector::new().with_opaque_table("rawcore", "rc_order");
    let dataset = catalog.get_by_name("rawcore.rc_order").unwrap();
    let plan = build_plan(dataset, &live, Dialect::DuckDb, &MaterializationPolicy::default()).unwrap();

    assert!(plan.table_exists);
    assert_eq!(plan.count("ADD_COLUMN"), 2);
    assert!(plan.warnings.iter().any(|w| w.starts_with("NO_COLUMNS_RETURNED")));
}

#[test]
fn test_live_schema_from_json() {
    let live = StaticIntrospector::from_json(
        r#"{ "schemas": ["RAWCORE"],
             "tables": { "RAWCORE.RC_ORDER": { "columns": [
               { "name": "ID", "datatype": "bigint" },
               { "name": "NEW_COL", "datatype": "text" } ] } } }"#,
    )
    .unwrap();
    let catalog = orders(vec![Column::new("id", "bigint", 1), renamed_column()]);
    let dataset = catalog.get_by_name("rawcore.rc_order").unwrap();
    let plan = build_plan(dataset, &live, Dialect::Postgres, &MaterializationPolicy::default()).unwrap();

    assert!(plan.steps.is_empty());
    assert_eq!(plan.warnings.len(), 1);
    assert!(plan.warnings[0].starts_with("TYPE_DRIFT"), "{:?}", plan.warnings);
}
