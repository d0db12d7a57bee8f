#[path = "../common/mod.rs"]
mod common;

use common::customer_catalog;
use strata::metadata::DatasetKey;
use strata::orchestrator::{
    build_plan, diff_snapshots, execute, resolve_order, step_records, ExecutionPolicy,
    ExecutionSnapshot, RunLogRecord, RunStatus, SnapshotContext, StepFailure, StepKind,
    StepStatus,
};

fn policy(continue_on_error: bool) -> ExecutionPolicy {
    ExecutionPolicy {
        continue_on_error,
        ..Default::default()
    }
}

#[test]
fn test_failed_stage_blocks_downstream() {
    let catalog = customer_catalog();
    let order = resolve_order(&catalog, &[DatasetKey::new("rawcore", "rc_customer")]).unwrap();
    let plan = build_plan("batch-1", &order);
    assert_eq!(
        plan.keys().cloned().collect::<Vec<_>>(),
        vec![
            DatasetKey::new("stage", "stg_customer"),
            DatasetKey::new("rawcore", "rc_customer"),
            DatasetKey::new("rawcore", "rc_customer_hist"),
        ]
    );

    let mut calls = vec![];
    let outcome = execute(&plan, &policy(true), |ctx| {
        calls.push(ctx.step.dataset_key.to_string());
        if ctx.step.dataset_key.schema == "stage" {
            return Err(StepFailure::fatal("relation stage.stg_customer does not exist"));
        }
        Ok(())
    });

    assert!(outcome.had_error);
    assert_eq!(calls, vec!["stage.stg_customer"]);

    let stg = &outcome.results[0];
    assert_eq!(stg.dataset, "stage.stg_customer");
    assert_eq!(stg.status, StepStatus::Error);
    assert_eq!(stg.status_reason.as_deref(), Some("not_retriable"));

    for blocked in &outcome.results[1..] {
        assert_eq!(blocked.status, StepStatus::Skipped);
        assert_eq!(blocked.kind, StepKind::Blocked);
        assert_eq!(blocked.blocked_by.as_deref(), Some("stage.stg_customer"));
        assert_eq!(blocked.status_reason.as_deref(), Some("upstream_failed"));
    }
}

#[test]
fn test_fail_fast_aborts_remaining_steps() {
    let catalog = customer_catalog();
    let order = resolve_order(&catalog, &[]).unwrap();
    let plan = build_plan("batch-2", &order);

    let outcome = execute(&plan, &policy(false), |_| {
        Err(StepFailure::retriable("connection reset"))
    });

    assert_eq!(outcome.results[0].status, StepStatus::Error);
    assert_eq!(outcome.results[0].attempt_no, 1);
    assert_eq!(
        outcome.aborted(),
        vec!["rawcore.rc_customer", "rawcore.rc_customer_hist"]
    );
    assert_eq!(outcome.counts_by_kind().get("aborted"), Some(&2));
}

#[test]
fn test_retries_only_on_real_runs() {
    let catalog = customer_catalog();
    let order = resolve_order(&catalog, &[DatasetKey::new("stage", "stg_customer")]).unwrap();
    let plan = build_plan("batch-3", &order);

    let live = ExecutionPolicy {
        execute: true,
        continue_on_error: false,
        max_retries: 2,
    };
    let mut attempts = 0;
    let outcome = execute(&plan, &live, |ctx| {
        attempts += 1;
        if ctx.attempt_no < 3 {
            Err(StepFailure::retriable("deadlock victim"))
        } else {
            Ok(())
        }
    });
    assert_eq!(attempts, 3);
    assert_eq!(outcome.results[0].status, StepStatus::Success);
    assert_eq!(outcome.results[0].status_reason.as_deref(), Some("succeeded_after_retry"));

    let stg = DatasetKey::new("stage", "stg_customer");
    let base = RunLogRecord::start("batch-3", &stg, "warehouse", "dev");
    let result = &outcome.results[0];
    let rows = step_records(&base, result, outcome.attempts_of(&result.dataset), true);
    assert_eq!(
        rows.iter().map(|r| (r.attempt_no, r.status)).collect::<Vec<_>>(),
        vec![(1, RunStatus::Error), (2, RunStatus::Error), (3, RunStatus::Success)]
    );
    assert_eq!(rows[0].error_message.as_deref(), Some("deadlock victim"));
    assert!(rows.iter().all(|r| r.load_run_id == base.load_run_id));

    let dry = ExecutionPolicy {
        execute: false,
        ..live
    };
    let mut attempts = 0;
    let outcome = execute(&plan, &dry, |_| {
        attempts += 1;
        Err(StepFailure::retriable("deadlock victim"))
    });
    assert_eq!(attempts, 1);
    assert_eq!(outcome.results[0].kind, StepKind::DryRun);
}

#[test]
fn test_snapshot_round_trip_and_diff() {
    let catalog = customer_catalog();
    let order = resolve_order(&catalog, &[]).unwrap();
    let plan = build_plan("batch-4", &order);
    let ok = execute(&plan, &policy(true), |_| Ok(()));
    let failed = execute(&plan, &policy(true), |ctx| {
        if ctx.step.dataset_key.name == "rc_customer" {
            Err(StepFailure::fatal("boom"))
        } else {
            Ok(())
        }
    });

    let context = SnapshotContext::new(&policy(true), "dev", "warehouse", "duckdb");
    let before = ExecutionSnapshot::new(&plan, &ok, context.clone());
    let after = ExecutionSnapshot::new(&plan, &failed, context);

    let parsed = ExecutionSnapshot::from_json(&before.to_json().unwrap()).unwrap();
    assert_eq!(parsed, before);
    assert!(diff_snapshots(&before, &parsed).is_empty());

    let diff = diff_snapshots(&before, &after);
    assert!(diff.added.is_empty());
    assert!(diff.removed.is_empty());
    assert!(!diff.order_changed);
    // rc_customer: status; rc_customer_hist: status, kind and attempt.
    assert_eq!(diff.transitions.len(), 4);
    assert!(diff
        .render()
        .contains("~ rawcore.rc_customer.status: success -> error"));
}
