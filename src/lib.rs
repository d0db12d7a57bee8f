//! # strata
//!
//! A metadata-driven ELT core: compiles load SQL for many warehouse
//! dialects from a catalog of datasets and orchestrates its execution.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Catalog (metadata JSON)                  │
//! │   (schemas, datasets, columns, sources, query nodes)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!          ┌───────────────┼────────────────┐
//!          ▼ [load]        ▼ [materialize]  ▼ [orchestrator]
//! ┌────────────────┐ ┌──────────────────┐ ┌─────────────────┐
//! │ load plan,     │ │ schema drift,    │ │ order, execute, │
//! │ merge, deletes,│ │ additive DDL     │ │ snapshot, diff, │
//! │ history (SCD2) │ │                  │ │ manifest, log   │
//! └────────────────┘ └──────────────────┘ └─────────────────┘
//!          │               │
//!          ▼ [sql]         ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │     Expression / plan model, emitted per SQL dialect     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod load;
pub mod materialize;
pub mod metadata;
pub mod orchestrator;
pub mod sql;
