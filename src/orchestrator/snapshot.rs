//! Execution snapshots and snapshot diffing.
//!
//! A snapshot is the audit record of one orchestration run: the policy it
//! ran under, the plan, and every step outcome. It never contains rendered
//! SQL. Keys are serialized in sorted order so two snapshots of the same
//! run compare line by line.

use super::execute::{ExecutionOutcome, ExecutionPolicy, StepResult};
use super::plan::{ExecutionPlan, ExecutionStep};
use super::OrchestratorResult;
use crate::metadata::{Catalog, Dataset};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotContext {
    pub execute: bool,
    pub continue_on_error: bool,
    pub max_retries: u32,
    pub profile: String,
    pub target_system: String,
    pub dialect: String,
    pub root_dataset: Option<String>,
    /// SHA-256 of the catalog the plan was resolved from.
    #[serde(default)]
    pub catalog_fingerprint: Option<String>,
}

impl SnapshotContext {
    pub fn new(policy: &ExecutionPolicy, profile: &str, target_system: &str, dialect: &str) -> Self {
        Self {
            execute: policy.execute,
            continue_on_error: policy.continue_on_error,
            max_retries: policy.max_retries,
            profile: profile.to_string(),
            target_system: target_system.to_string(),
            dialect: dialect.to_string(),
            root_dataset: None,
            catalog_fingerprint: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPlan {
    pub step_count: usize,
    pub steps: Vec<ExecutionStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotOutcome {
    pub had_error: bool,
    pub counts_by_status: BTreeMap<String, usize>,
    pub counts_by_kind: BTreeMap<String, usize>,
    pub results: Vec<StepResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub batch_run_id: String,
    pub created_at: DateTime<Utc>,
    pub context: SnapshotContext,
    pub plan: SnapshotPlan,
    pub outcome: SnapshotOutcome,
}

impl ExecutionSnapshot {
    pub fn new(plan: &ExecutionPlan, outcome: &ExecutionOutcome, context: SnapshotContext) -> Self {
        Self {
            batch_run_id: plan.batch_id.clone(),
            created_at: Utc::now(),
            context,
            plan: SnapshotPlan {
                step_count: plan.step_count(),
                steps: plan.steps.clone(),
            },
            outcome: SnapshotOutcome {
                had_error: outcome.had_error,
                counts_by_status: outcome.counts_by_status(),
                counts_by_kind: outcome.counts_by_kind(),
                results: outcome.results.clone(),
            },
        }
    }

    /// Pretty JSON with every object's keys sorted.
    pub fn to_json(&self) -> OrchestratorResult<String> {
        // `Value` objects are ordered maps, which sorts struct fields too.
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }

    pub fn from_json(json: &str) -> OrchestratorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// SHA-256 over the catalog's datasets, in key order.
pub fn catalog_fingerprint(catalog: &Catalog) -> OrchestratorResult<String> {
    let mut datasets: Vec<&Dataset> = catalog.datasets().collect();
    datasets.sort_by_key(|d| d.key());
    let json = serde_json::to_string(&serde_json::to_value(&datasets)?)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Diff
// ============================================================================

/// A value that changed between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    /// `context.<field>` or `<dataset>.<field>`.
    pub field: String,
    pub before: String,
    pub after: String,
}

impl FieldChange {
    fn new(field: String, before: impl ToString, after: impl ToString) -> Self {
        Self {
            field,
            before: before.to_string(),
            after: after.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Datasets present in both runs were scheduled in a different order.
    pub order_changed: bool,
    pub dependency_changes: Vec<FieldChange>,
    pub policy_changes: Vec<FieldChange>,
    /// Status, kind and attempt transitions per dataset.
    pub transitions: Vec<FieldChange>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && !self.order_changed
            && self.dependency_changes.is_empty()
            && self.policy_changes.is_empty()
            && self.transitions.is_empty()
    }

    /// One line per difference.
    pub fn render(&self) -> String {
        let mut lines = vec![];
        lines.extend(self.added.iter().map(|d| format!("+ {}", d)));
        lines.extend(self.removed.iter().map(|d| format!("- {}", d)));
        if self.order_changed {
            lines.push("~ execution order changed".to_string());
        }
        for change in self
            .policy_changes
            .iter()
            .chain(&self.dependency_changes)
            .chain(&self.transitions)
        {
            lines.push(format!("~ {}: {} -> {}", change.field, change.before, change.after));
        }
        lines.join("\n")
    }
}

/// Compare two snapshots field by field.
pub fn diff_snapshots(before: &ExecutionSnapshot, after: &ExecutionSnapshot) -> SnapshotDiff {
    let mut diff = SnapshotDiff::default();

    let (b, a) = (&before.context, &after.context);
    let mut policy = |field: &str, before: String, after: String| {
        if before != after {
            diff.policy_changes
                .push(FieldChange::new(format!("context.{}", field), before, after));
        }
    };
    policy("execute", b.execute.to_string(), a.execute.to_string());
    policy(
        "continue_on_error",
        b.continue_on_error.to_string(),
        a.continue_on_error.to_string(),
    );
    policy("max_retries", b.max_retries.to_string(), a.max_retries.to_string());
    policy("profile", b.profile.clone(), a.profile.clone());
    policy("target_system", b.target_system.clone(), a.target_system.clone());
    policy("dialect", b.dialect.clone(), a.dialect.clone());
    policy(
        "root_dataset",
        b.root_dataset.clone().unwrap_or_default(),
        a.root_dataset.clone().unwrap_or_default(),
    );

    let steps_before = step_map(&before.plan.steps);
    let steps_after = step_map(&after.plan.steps);
    let keys_before: BTreeSet<&String> = steps_before.keys().collect();
    let keys_after: BTreeSet<&String> = steps_after.keys().collect();
    diff.added = keys_after
        .difference(&keys_before)
        .map(|k| k.to_string())
        .collect();
    diff.removed = keys_before
        .difference(&keys_after)
        .map(|k| k.to_string())
        .collect();

    let common_order = |steps: &[ExecutionStep], other: &BTreeMap<String, &ExecutionStep>| {
        steps
            .iter()
            .map(|s| s.dataset_key.to_string())
            .filter(|k| other.contains_key(k))
            .collect::<Vec<_>>()
    };
    diff.order_changed = common_order(&before.plan.steps, &steps_after)
        != common_order(&after.plan.steps, &steps_before);

    for (key, old) in &steps_before {
        if let Some(new) = steps_after.get(key) {
            if old.upstream_keys != new.upstream_keys {
                diff.dependency_changes.push(FieldChange::new(
                    format!("{}.upstream_keys", key),
                    join_keys(old),
                    join_keys(new),
                ));
            }
        }
    }

    let results_before = result_map(&before.outcome.results);
    let results_after = result_map(&after.outcome.results);
    for (key, old) in &results_before {
        let Some(new) = results_after.get(key) else {
            continue;
        };
        if old.status != new.status {
            diff.transitions
                .push(FieldChange::new(format!("{}.status", key), old.status, new.status));
        }
        if old.kind != new.kind {
            diff.transitions
                .push(FieldChange::new(format!("{}.kind", key), old.kind, new.kind));
        }
        if old.attempt_no != new.attempt_no {
            diff.transitions.push(FieldChange::new(
                format!("{}.attempt_no", key),
                old.attempt_no,
                new.attempt_no,
            ));
        }
    }

    diff
}

fn step_map(steps: &[ExecutionStep]) -> BTreeMap<String, &ExecutionStep> {
    steps
        .iter()
        .map(|s| (s.dataset_key.to_string(), s))
        .collect()
}

fn result_map(results: &[StepResult]) -> BTreeMap<&str, &StepResult> {
    results.iter().map(|r| (r.dataset.as_str(), r)).collect()
}

fn join_keys(step: &ExecutionStep) -> String {
    let keys: Vec<String> = step.upstream_keys.iter().map(|k| k.to_string()).collect();
    format!("[{}]", keys.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{build_plan, execute, resolve_order, StepFailure, StepKind};

    fn snapshot(fail: Option<&str>, policy: ExecutionPolicy) -> ExecutionSnapshot {
        let catalog = crate::load::test_fixtures::customer_catalog();
        let order = resolve_order(&catalog, &[]).unwrap();
        let plan = build_plan("batch-1", &order);
        let outcome = execute(&plan, &policy, |ctx| {
            // Rendered SQL stays inside the callback.
            let _sql = format!("SELECT * FROM {}", ctx.step.dataset_key);
            match fail {
                Some(name) if ctx.step.dataset_key.name == name => {
                    Err(StepFailure::retriable("connection reset"))
                }
                _ => Ok(()),
            }
        });
        let mut context = SnapshotContext::new(&policy, "dev", "warehouse", "postgres");
        context.catalog_fingerprint = Some(catalog_fingerprint(&catalog).unwrap());
        ExecutionSnapshot::new(&plan, &outcome, context)
    }

    #[test]
    fn test_snapshot_json_has_sorted_keys_and_no_sql() {
        let json = snapshot(None, ExecutionPolicy::default()).to_json().unwrap();
        let batch = json.find("\"batch_run_id\"").unwrap();
        let context = json.find("\"context\"").unwrap();
        let created = json.find("\"created_at\"").unwrap();
        let outcome = json.find("\"outcome\"").unwrap();
        let plan = json.find("\"plan\"").unwrap();
        assert!(batch < context && context < created && created < outcome && outcome < plan);
        assert!(!json.contains("SELECT"));
        assert!(json.contains("\"step_count\": 3"));
    }

    #[test]
    fn test_snapshot_round_trips_through_json() {
        let snap = snapshot(Some("stg_customer"), ExecutionPolicy::default());
        let parsed = ExecutionSnapshot::from_json(&snap.to_json().unwrap()).unwrap();
        assert_eq!(parsed, snap);
        assert_eq!(parsed.outcome.counts_by_kind["aborted"], 2);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let catalog = crate::load::test_fixtures::customer_catalog();
        let first = catalog_fingerprint(&catalog).unwrap();
        assert_eq!(first, catalog_fingerprint(&catalog).unwrap());
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_identical_runs_have_empty_diff() {
        let a = snapshot(None, ExecutionPolicy::default());
        let b = snapshot(None, ExecutionPolicy::default());
        assert!(diff_snapshots(&a, &b).is_empty());
    }

    #[test]
    fn test_diff_reports_policy_and_transitions() {
        let before = snapshot(None, ExecutionPolicy::default());
        let after = snapshot(
            Some("stg_customer"),
            ExecutionPolicy {
                continue_on_error: true,
                ..Default::default()
            },
        );
        let diff = diff_snapshots(&before, &after);
        assert_eq!(diff.policy_changes.len(), 1);
        assert_eq!(diff.policy_changes[0].field, "context.continue_on_error");
        assert!(diff.transitions.contains(&FieldChange::new(
            "stage.stg_customer.status".into(),
            "success",
            "error"
        )));
        assert!(diff.transitions.contains(&FieldChange::new(
            "rawcore.rc_customer.kind".into(),
            StepKind::DryRun,
            StepKind::Blocked
        )));
        assert!(diff.render().contains("~ rawcore.rc_customer.status: success -> skipped"));
    }

    #[test]
    fn test_diff_reports_added_removed_and_dependencies() {
        let before = snapshot(None, ExecutionPolicy::default());
        let mut after = before.clone();
        after.plan.steps.remove(2);
        after.plan.steps[1].upstream_keys.clear();
        after.plan.steps.push(ExecutionStep {
            dataset_id: 9,
            dataset_key: "serving.customers".parse().unwrap(),
            upstream_keys: vec![],
        });
        let diff = diff_snapshots(&before, &after);
        assert_eq!(diff.added, vec!["serving.customers"]);
        assert_eq!(diff.removed, vec!["rawcore.rc_customer_hist"]);
        assert!(!diff.order_changed);
        assert_eq!(
            diff.dependency_changes[0],
            FieldChange::new(
                "rawcore.rc_customer.upstream_keys".into(),
                "[stage.stg_customer]",
                "[]"
            )
        );
    }

    #[test]
    fn test_diff_detects_order_change() {
        let before = snapshot(None, ExecutionPolicy::default());
        let mut after = before.clone();
        after.plan.steps.swap(1, 2);
        assert!(diff_snapshots(&before, &after).order_changed);
    }
}
