//! Run-log records and additive provisioning of the run-log table.
//!
//! Provisioning returns its statements or an error and never logs or
//! swallows anything itself; callers decide what a failure means, which
//! for a load is always "log it and carry on".

use super::execute::{AttemptRecord, StepResult, StepStatus};
use crate::load::LoadPlan;
use crate::materialize::{IntrospectError, SchemaIntrospector};
use crate::metadata::DatasetKey;
use crate::sql::ddl::{self, ColumnSpec};
use crate::sql::{DataType, Dialect, SqlDialect, SqlError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("run-log schema '{schema}' is missing and {dialect} cannot create it")]
    SchemaMissing { schema: String, dialect: Dialect },

    #[error(transparent)]
    Introspect(#[from] IntrospectError),

    #[error(transparent)]
    Sql(#[from] SqlError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
    Skipped,
    DryRun,
}

/// One attempt-level row of the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogRecord {
    pub batch_id: String,
    pub load_run_id: String,
    pub target_schema: String,
    pub target_dataset: String,
    pub target_system: String,
    pub profile: String,
    pub mode: Option<String>,
    pub handle_deletes: bool,
    pub historize: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub render_ms: u64,
    pub execution_ms: u64,
    pub sql_length: usize,
    pub rows_affected: Option<u64>,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub attempt_no: u32,
    pub status_reason: Option<String>,
    pub blocked_by: Option<String>,
}

impl RunLogRecord {
    /// A record started now with a fresh load-run id.
    pub fn start(batch_id: &str, dataset: &DatasetKey, target_system: &str, profile: &str) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            load_run_id: uuid::Uuid::new_v4().to_string(),
            target_schema: dataset.schema.clone(),
            target_dataset: dataset.name.clone(),
            target_system: target_system.to_string(),
            profile: profile.to_string(),
            mode: None,
            handle_deletes: false,
            historize: false,
            started_at: Utc::now(),
            finished_at: None,
            render_ms: 0,
            execution_ms: 0,
            sql_length: 0,
            rows_affected: None,
            status: RunStatus::Skipped,
            error_message: None,
            attempt_no: 0,
            status_reason: None,
            blocked_by: None,
        }
    }

    /// Use the id the load's SQL was rendered with.
    pub fn with_load_run_id(mut self, load_run_id: &str) -> Self {
        self.load_run_id = load_run_id.to_string();
        self
    }

    pub fn with_plan(mut self, plan: &LoadPlan) -> Self {
        self.mode = Some(plan.mode.to_string());
        self.handle_deletes = plan.handle_deletes;
        self.historize = plan.historize;
        self
    }

    /// Close the record with the step's final result.
    pub fn finish(mut self, result: &StepResult, executed: bool) -> Self {
        self.status = match result.status {
            StepStatus::Success if executed => RunStatus::Success,
            StepStatus::Success => RunStatus::DryRun,
            StepStatus::Error => RunStatus::Error,
            StepStatus::Skipped | StepStatus::Pending | StepStatus::Running => RunStatus::Skipped,
        };
        self.attempt_no = result.attempt_no;
        self.status_reason = result.status_reason.clone();
        self.blocked_by = result.blocked_by.clone();
        if result.status == StepStatus::Error {
            self.error_message = result.message.clone();
        }
        self.finished_at = Some(Utc::now());
        self
    }

    /// Close the record with an attempt that was followed by a retry.
    pub fn finish_attempt(mut self, attempt: &AttemptRecord, executed: bool) -> Self {
        self.status = match attempt.status {
            StepStatus::Success if executed => RunStatus::Success,
            StepStatus::Success => RunStatus::DryRun,
            _ => RunStatus::Error,
        };
        self.attempt_no = attempt.attempt_no;
        self.status_reason = attempt.retried.then(|| "retried".to_string());
        self.error_message = attempt.message.clone();
        self.finished_at = Some(Utc::now());
        self
    }
}

/// Run-log rows of one step: one per attempt, the last closed with the
/// step's final result. A step never invoked (blocked, aborted) gets a
/// single row.
pub fn step_records<'a>(
    base: &RunLogRecord,
    result: &StepResult,
    attempts: impl IntoIterator<Item = &'a AttemptRecord>,
    executed: bool,
) -> Vec<RunLogRecord> {
    let mut records: Vec<RunLogRecord> = attempts
        .into_iter()
        .filter(|a| a.attempt_no < result.attempt_no)
        .map(|a| base.clone().finish_attempt(a, executed))
        .collect();
    records.push(base.clone().finish(result, executed));
    records
}

/// Physical columns of the run-log table.
pub fn run_log_columns() -> Vec<ColumnSpec> {
    let name = DataType::Varchar(256);
    let short = DataType::Varchar(64);
    vec![
        ColumnSpec::new("batch_id", short.clone()).not_null(),
        ColumnSpec::new("load_run_id", short.clone()).not_null(),
        ColumnSpec::new("target_schema", name.clone()),
        ColumnSpec::new("target_dataset", name.clone()),
        ColumnSpec::new("target_system", name.clone()),
        ColumnSpec::new("profile", name.clone()),
        ColumnSpec::new("mode", short.clone()),
        ColumnSpec::new("handle_deletes", DataType::Bool),
        ColumnSpec::new("historize", DataType::Bool),
        ColumnSpec::new("started_at", DataType::Timestamp),
        ColumnSpec::new("finished_at", DataType::Timestamp),
        ColumnSpec::new("render_ms", DataType::Int64),
        ColumnSpec::new("execution_ms", DataType::Int64),
        ColumnSpec::new("sql_length", DataType::Int64),
        ColumnSpec::new("rows_affected", DataType::Int64),
        ColumnSpec::new("status", short.clone()),
        ColumnSpec::new("error_message", DataType::String),
        ColumnSpec::new("attempt_no", DataType::Int32),
        ColumnSpec::new("status_reason", short),
        ColumnSpec::new("blocked_by", name),
    ]
}

/// DDL that brings the run-log table up to date: create the schema and
/// table when missing, otherwise add the missing columns. Never drops or
/// retypes anything.
pub fn plan_run_log_provisioning(
    live: &dyn SchemaIntrospector,
    dialect: Dialect,
    schema: &str,
    table: &str,
) -> Result<Vec<String>, RunLogError> {
    let mut statements = vec![];
    if !live.schema_exists(schema)? {
        if dialect.emit_create_schema(schema).is_none() {
            return Err(RunLogError::SchemaMissing {
                schema: schema.to_string(),
                dialect,
            });
        }
        statements.push(ddl::create_schema(dialect, schema)?);
    }

    let columns = run_log_columns();
    if !live.table_exists(schema, table)? {
        statements.push(ddl::create_table(dialect, Some(schema), table, &columns)?);
        return Ok(statements);
    }

    let existing: BTreeSet<String> = live
        .columns(schema, table)?
        .into_iter()
        .map(|c| c.name.to_lowercase())
        .collect();
    if existing.is_empty() {
        // Column list unavailable; adding every column would fail anyway.
        return Ok(statements);
    }
    for column in columns.iter().filter(|c| !existing.contains(&c.name)) {
        // Added columns are nullable whatever the create-time definition.
        let spec = ColumnSpec::new(&column.name, column.data_type.clone());
        statements.push(ddl::add_column(dialect, Some(schema), table, &spec)?);
    }
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::{LiveColumn, StaticIntrospector};
    use crate::orchestrator::StepKind;

    #[test]
    fn test_provision_missing_table() {
        let live = StaticIntrospector::new();
        let sql = plan_run_log_provisioning(&live, Dialect::Postgres, "ops", "run_log").unwrap();
        assert_eq!(sql.len(), 2);
        assert_eq!(sql[0], "CREATE SCHEMA IF NOT EXISTS \"ops\"");
        assert!(sql[1].starts_with("CREATE TABLE IF NOT EXISTS \"ops\".\"run_log\" ("));
        assert!(sql[1].contains("\"batch_id\" VARCHAR(64) NOT NULL"));
    }

    #[test]
    fn test_provision_adds_missing_columns_only() {
        let mut present: Vec<LiveColumn> = run_log_columns()
            .iter()
            .map(|c| LiveColumn::new(&c.name.to_uppercase(), "text"))
            .collect();
        present.retain(|c| c.name != "BLOCKED_BY");
        let live = StaticIntrospector::new().with_table("ops", "run_log", present);
        let sql = plan_run_log_provisioning(&live, Dialect::Postgres, "ops", "run_log").unwrap();
        assert_eq!(
            sql,
            vec!["ALTER TABLE \"ops\".\"run_log\" ADD COLUMN \"blocked_by\" VARCHAR(256)"]
        );
    }

    #[test]
    fn test_provision_failure_is_returned() {
        let err = plan_run_log_provisioning(&StaticIntrospector::new(), Dialect::Oracle, "ops", "run_log")
            .unwrap_err();
        assert!(matches!(err, RunLogError::SchemaMissing { .. }));
    }

    #[test]
    fn test_record_lifecycle() {
        let key = DatasetKey::new("rawcore", "rc_customer");
        let result = StepResult {
            dataset: key.to_string(),
            status: StepStatus::Skipped,
            kind: StepKind::Blocked,
            attempt_no: 0,
            status_reason: Some("upstream_failed".into()),
            blocked_by: Some("stage.stg_customer".into()),
            message: Some("upstream stage.stg_customer failed".into()),
        };
        let record = RunLogRecord::start("b1", &key, "warehouse", "dev").finish(&result, true);
        assert_eq!(record.status, RunStatus::Skipped);
        assert_eq!(record.blocked_by.as_deref(), Some("stage.stg_customer"));
        assert!(record.error_message.is_none());
        assert!(record.finished_at.is_some());
        assert_eq!(record.load_run_id.len(), 36);

        let ok = StepResult {
            status: StepStatus::Success,
            kind: StepKind::DryRun,
            attempt_no: 1,
            status_reason: None,
            blocked_by: None,
            message: None,
            ..result
        };
        let dry = RunLogRecord::start("b1", &key, "warehouse", "dev").finish(&ok, false);
        assert_eq!(dry.status, RunStatus::DryRun);
        let json = serde_json::to_string(&dry).unwrap();
        assert!(json.contains("\"status\":\"dry_run\""));
    }

    #[test]
    fn test_one_record_per_attempt() {
        use crate::orchestrator::{execute, ExecutionPlan, ExecutionPolicy, ExecutionStep, StepFailure};

        let key = DatasetKey::new("rawcore", "rc_customer");
        let plan = ExecutionPlan {
            batch_id: "b1".into(),
            steps: vec![ExecutionStep {
                dataset_id: 2,
                dataset_key: key.clone(),
                upstream_keys: vec![],
            }],
        };
        let policy = ExecutionPolicy {
            execute: true,
            continue_on_error: false,
            max_retries: 2,
        };
        let outcome = execute(&plan, &policy, |_| Err(StepFailure::retriable("lock timeout")));

        let base = RunLogRecord::start("b1", &key, "warehouse", "dev").with_load_run_id("run-7");
        let result = &outcome.results[0];
        let records = step_records(&base, result, outcome.attempts_of(&result.dataset), true);

        let rows: Vec<(u32, RunStatus, Option<&str>)> = records
            .iter()
            .map(|r| (r.attempt_no, r.status, r.status_reason.as_deref()))
            .collect();
        assert_eq!(
            rows,
            vec![
                (1, RunStatus::Error, Some("retried")),
                (2, RunStatus::Error, Some("retried")),
                (3, RunStatus::Error, Some("retries_exhausted")),
            ]
        );
        assert!(records.iter().all(|r| r.load_run_id == "run-7"));
        assert!(records
            .iter()
            .all(|r| r.error_message.as_deref() == Some("lock timeout")));
    }

    #[test]
    fn test_never_invoked_step_gets_one_record() {
        let key = DatasetKey::new("rawcore", "rc_customer");
        let result = StepResult {
            dataset: key.to_string(),
            status: StepStatus::Skipped,
            kind: StepKind::Aborted,
            attempt_no: 0,
            status_reason: Some("batch_aborted".into()),
            blocked_by: None,
            message: None,
        };
        let base = RunLogRecord::start("b1", &key, "warehouse", "dev");
        let records = step_records(&base, &result, std::iter::empty(), true);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RunStatus::Skipped);
    }
}
