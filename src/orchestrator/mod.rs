//! Execution orchestration.
//!
//! Resolves which datasets a run touches and in what order, executes the
//! resulting plan through an injected callback, and produces the audit
//! artifacts of the run:
//!
//! - [`resolve`] - dependency graph, deterministic topological order, levels
//! - [`plan`] - execution plans
//! - [`execute`] - blocked / retry / fail-fast execution
//! - [`snapshot`] - run snapshots and snapshot diffing
//! - [`manifest`] - dependency manifest for external schedulers
//! - [`runlog`] - run-log records and table provisioning
//!
//! The orchestrator does not know how a dataset is loaded. Callers pass a
//! run callback that composes load SQL and talks to the warehouse.

pub mod execute;
pub mod manifest;
pub mod plan;
pub mod resolve;
pub mod runlog;
pub mod snapshot;

use crate::metadata::MetadataError;
use thiserror::Error;

pub use execute::{
    execute, AttemptRecord, ExecutionOutcome, ExecutionPolicy, StepContext, StepFailure, StepKind,
    StepResult, StepStatus,
};
pub use manifest::{build_manifest, Manifest, ManifestNode, NodeType};
pub use plan::{build_plan, new_batch_id, ExecutionPlan, ExecutionStep};
pub use resolve::{resolve_order, DependencyGraph};
pub use runlog::{
    plan_run_log_provisioning, step_records, RunLogError, RunLogRecord, RunStatus,
};
pub use snapshot::{
    catalog_fingerprint, diff_snapshots, ExecutionSnapshot, FieldChange, SnapshotContext,
    SnapshotDiff,
};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("dependency cycle detected: {0}")]
    CycleDetected(String),

    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("failed to serialize: {0}")]
    Json(#[from] serde_json::Error),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
