//! Sequential plan execution with blocked, retry and fail-fast handling.
//!
//! Each step moves `pending -> running -> success | error`, or straight to
//! `skipped` when it is blocked by a failed upstream or aborted by a
//! fail-fast batch. Steps run strictly in plan order, once per attempt,
//! on the calling thread.

use super::plan::{ExecutionPlan, ExecutionStep};
use crate::load::LoadError;
use crate::metadata::DatasetKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionPolicy {
    /// Run against the warehouse; otherwise render only (dry run).
    pub execute: bool,
    pub continue_on_error: bool,
    /// Extra attempts after a failed first attempt, real runs only.
    pub max_retries: u32,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            execute: false,
            continue_on_error: false,
            max_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Error,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Error => "error",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a step reached its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Execute,
    DryRun,
    Blocked,
    Aborted,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Execute => "execute",
            StepKind::DryRun => "dry_run",
            StepKind::Blocked => "blocked",
            StepKind::Aborted => "aborted",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a run callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub message: String,
    /// Worth another attempt (connection drops, lock timeouts).
    pub retriable: bool,
}

impl StepFailure {
    pub fn retriable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retriable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retriable: false,
        }
    }
}

impl From<LoadError> for StepFailure {
    fn from(err: LoadError) -> Self {
        Self {
            retriable: err.is_retriable(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// What the run callback sees for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub batch_id: &'a str,
    pub step: &'a ExecutionStep,
    /// 1-based.
    pub attempt_no: u32,
    pub execute: bool,
}

/// Final record of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub dataset: String,
    pub status: StepStatus,
    pub kind: StepKind,
    /// Attempts made; 0 when the step was never invoked.
    pub attempt_no: u32,
    pub status_reason: Option<String>,
    pub blocked_by: Option<String>,
    pub message: Option<String>,
}

/// Outcome of one invocation of the run callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub dataset: String,
    /// 1-based.
    pub attempt_no: u32,
    pub status: StepStatus,
    /// Another attempt followed this one.
    pub retried: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub had_error: bool,
    pub results: Vec<StepResult>,
    /// Every callback invocation in order, retries included.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
}

impl ExecutionOutcome {
    pub fn counts_by_status(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.status.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn counts_by_kind(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.kind.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// The first step that actually failed.
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.results.iter().find(|r| r.status == StepStatus::Error)
    }

    /// Attempts made for `dataset`, first to last.
    pub fn attempts_of<'a>(&'a self, dataset: &'a str) -> impl Iterator<Item = &'a AttemptRecord> {
        self.attempts.iter().filter(move |a| a.dataset == dataset)
    }

    /// Datasets never attempted because the batch was aborted.
    pub fn aborted(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.kind == StepKind::Aborted)
            .map(|r| r.dataset.as_str())
            .collect()
    }
}

/// Run `plan` step by step through `run_fn`.
///
/// A step whose upstream (directly, or through a blocked upstream) ended in
/// `error` is skipped as `blocked` without invoking `run_fn`. Without
/// `continue_on_error`, the first failure turns every later step into an
/// `aborted` skip. Failures flagged retriable are retried up to
/// `max_retries` times, and only when `policy.execute` is set.
pub fn execute<F>(plan: &ExecutionPlan, policy: &ExecutionPolicy, mut run_fn: F) -> ExecutionOutcome
where
    F: FnMut(&StepContext<'_>) -> Result<(), StepFailure>,
{
    let mut outcome = ExecutionOutcome::default();
    // Last known status per visited dataset, and the failed root behind
    // each blocked one.
    let mut statuses: BTreeMap<&DatasetKey, StepStatus> = BTreeMap::new();
    let mut failed_root: BTreeMap<&DatasetKey, String> = BTreeMap::new();
    let mut aborted_after: Option<String> = None;

    for step in &plan.steps {
        let key = &step.dataset_key;

        if let Some(failed) = &aborted_after {
            log::info!("{}: skipped (aborted after {})", key, failed);
            outcome.results.push(StepResult {
                dataset: key.to_string(),
                status: StepStatus::Skipped,
                kind: StepKind::Aborted,
                attempt_no: 0,
                status_reason: Some("batch_aborted".into()),
                blocked_by: None,
                message: Some(format!("not attempted: batch aborted after {} failed", failed)),
            });
            continue;
        }

        let blocker = step.upstream_keys.iter().find_map(|up| {
            match statuses.get(up) {
                Some(StepStatus::Error) => Some(up.to_string()),
                Some(StepStatus::Skipped) => failed_root.get(up).cloned(),
                _ => None,
            }
        });
        if let Some(blocked_by) = blocker {
            log::info!("{}: skipped (blocked by {})", key, blocked_by);
            statuses.insert(key, StepStatus::Skipped);
            failed_root.insert(key, blocked_by.clone());
            outcome.results.push(StepResult {
                dataset: key.to_string(),
                status: StepStatus::Skipped,
                kind: StepKind::Blocked,
                attempt_no: 0,
                status_reason: Some("upstream_failed".into()),
                message: Some(format!("upstream {} failed", blocked_by)),
                blocked_by: Some(blocked_by),
            });
            continue;
        }

        let result = run_step(plan, step, policy, &mut run_fn, &mut outcome.attempts);
        statuses.insert(key, result.status);
        if result.status == StepStatus::Error {
            outcome.had_error = true;
            if !policy.continue_on_error {
                aborted_after = Some(key.to_string());
            }
        }
        outcome.results.push(result);
    }

    outcome
}

fn run_step<F>(
    plan: &ExecutionPlan,
    step: &ExecutionStep,
    policy: &ExecutionPolicy,
    run_fn: &mut F,
    attempts: &mut Vec<AttemptRecord>,
) -> StepResult
where
    F: FnMut(&StepContext<'_>) -> Result<(), StepFailure>,
{
    let kind = if policy.execute {
        StepKind::Execute
    } else {
        StepKind::DryRun
    };
    let mut attempt_no = 1;
    loop {
        log::info!("{}: running (attempt {})", step.dataset_key, attempt_no);
        let context = StepContext {
            batch_id: &plan.batch_id,
            step,
            attempt_no,
            execute: policy.execute,
        };
        let attempted = run_fn(&context);
        let retried = match &attempted {
            Ok(()) => false,
            Err(failure) => policy.execute && failure.retriable && attempt_no <= policy.max_retries,
        };
        attempts.push(AttemptRecord {
            dataset: step.dataset_key.to_string(),
            attempt_no,
            status: if attempted.is_ok() {
                StepStatus::Success
            } else {
                StepStatus::Error
            },
            retried,
            message: attempted.as_ref().err().map(|f| f.message.clone()),
        });

        match attempted {
            Ok(()) => {
                log::info!("{}: success", step.dataset_key);
                return StepResult {
                    dataset: step.dataset_key.to_string(),
                    status: StepStatus::Success,
                    kind,
                    attempt_no,
                    status_reason: (attempt_no > 1).then(|| "succeeded_after_retry".into()),
                    blocked_by: None,
                    message: None,
                };
            }
            Err(failure) => {
                if retried {
                    log::warn!(
                        "{}: attempt {} failed, retrying: {}",
                        step.dataset_key,
                        attempt_no,
                        failure
                    );
                    attempt_no += 1;
                    continue;
                }
                log::info!("{}: error: {}", step.dataset_key, failure);
                let reason = if attempt_no > 1 {
                    "retries_exhausted"
                } else if failure.retriable {
                    "failed"
                } else {
                    "not_retriable"
                };
                return StepResult {
                    dataset: step.dataset_key.to_string(),
                    status: StepStatus::Error,
                    kind,
                    attempt_no,
                    status_reason: Some(reason.into()),
                    blocked_by: None,
                    message: Some(failure.message),
                };
            }
        }
    }
}
