//! Materialization and schema-drift planning.
//!
//! Compares a dataset's declared columns with the live warehouse and plans
//! additive DDL: create schema, rename table, rename column, add column,
//! and (opt-in) alter column type. Nothing is ever dropped.
//!
//! - [`introspect`] - the live-schema seam and a static implementation
//! - [`types`] - declared vs live type comparison
//! - [`planner`] - the DDL planner itself

pub mod introspect;
pub mod planner;
pub mod types;

pub use introspect::{
    IntrospectError, IntrospectResult, LiveColumn, SchemaIntrospector, StaticIntrospector,
};
pub use planner::{build_plan, DdlStep, MaterializationPlan, MaterializationPolicy};
pub use types::{compare_types, TypeComparison};
