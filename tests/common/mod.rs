//! Catalog fixtures shared by the integration tests.

#![allow(dead_code)]

use strata::metadata::Catalog;

/// stage.stg_customer feeds rawcore.rc_customer (merge with delete
/// detection and history); rawcore.rc_customer_hist is generated.
pub const CUSTOMER_CATALOG: &str = r#"{
  "schemas": [
    { "name": "stage" },
    { "name": "rawcore" }
  ],
  "datasets": [
    {
      "id": 1,
      "schema": "stage",
      "name": "stg_customer",
      "columns": [
        { "name": "CustomerID", "datatype": "int", "ordinal": 1 },
        { "name": "Name", "datatype": "varchar(200)", "ordinal": 2 },
        { "name": "Email", "datatype": "varchar(200)", "ordinal": 3 },
        { "name": "ModifiedAt", "datatype": "timestamp", "ordinal": 4 }
      ]
    },
    {
      "id": 2,
      "schema": "rawcore",
      "name": "rc_customer",
      "incremental_strategy": "merge",
      "historize": true,
      "handle_deletes": true,
      "natural_key_fields": ["customer_id"],
      "incremental_filter": "ModifiedAt >= {{DELTA_CUTOFF}}",
      "upstreams": ["stage.stg_customer"],
      "columns": [
        { "name": "rc_customer_key", "datatype": "varchar(64)", "ordinal": 1, "system_role": "surrogate_key" },
        { "name": "customer_id", "datatype": "bigint", "ordinal": 2, "system_role": "business_key",
          "lineage": [{ "upstream": "stage.stg_customer", "column": "CustomerID" }] },
        { "name": "name", "datatype": "varchar(200)", "ordinal": 3,
          "lineage": [{ "upstream": "stage.stg_customer", "column": "Name" }] },
        { "name": "email", "datatype": "varchar(200)", "ordinal": 4,
          "lineage": [{ "upstream": "stage.stg_customer", "column": "Email" }] },
        { "name": "modified_at", "datatype": "timestamp", "ordinal": 5,
          "lineage": [{ "upstream": "stage.stg_customer", "column": "ModifiedAt" }] },
        { "name": "row_hash", "datatype": "varchar(64)", "ordinal": 6, "system_role": "row_hash" },
        { "name": "load_run_id", "datatype": "varchar(64)", "ordinal": 7, "system_role": "load_run_id" },
        { "name": "loaded_at", "datatype": "timestamp", "ordinal": 8, "system_role": "loaded_at" }
      ]
    }
  ]
}"#;

pub fn customer_catalog() -> Catalog {
    Catalog::from_json(CUSTOMER_CATALOG).unwrap()
}
