//! Execution plans.

use crate::metadata::{Dataset, DatasetKey};
use serde::{Deserialize, Serialize};

/// One dataset load in an execution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub dataset_id: u32,
    pub dataset_key: DatasetKey,
    /// Immediate upstream datasets, sorted.
    pub upstream_keys: Vec<DatasetKey>,
}

/// Dependency-ordered steps of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub batch_id: String,
    pub steps: Vec<ExecutionStep>,
}

impl ExecutionPlan {
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DatasetKey> {
        self.steps.iter().map(|s| &s.dataset_key)
    }
}

/// Fresh batch id.
pub fn new_batch_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Build the plan for datasets already in dependency order.
pub fn build_plan(batch_id: impl Into<String>, order: &[&Dataset]) -> ExecutionPlan {
    let steps = order
        .iter()
        .map(|dataset| {
            let mut upstream_keys = dataset.upstreams.clone();
            upstream_keys.sort();
            upstream_keys.dedup();
            ExecutionStep {
                dataset_id: dataset.id,
                dataset_key: dataset.key(),
                upstream_keys,
            }
        })
        .collect();
    ExecutionPlan {
        batch_id: batch_id.into(),
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::resolve_order;

    #[test]
    fn test_plan_follows_order() {
        let catalog = crate::load::test_fixtures::customer_catalog();
        let order = resolve_order(&catalog, &[]).unwrap();
        let plan = build_plan("b-1", &order);
        assert_eq!(plan.batch_id, "b-1");
        assert_eq!(plan.step_count(), 3);
        assert_eq!(plan.steps[0].dataset_key.to_string(), "stage.stg_customer");
        assert!(plan.steps[0].upstream_keys.is_empty());
        assert_eq!(
            plan.steps[1].upstream_keys,
            vec![DatasetKey::new("stage", "stg_customer")]
        );
    }

    #[test]
    fn test_batch_ids_are_unique() {
        assert_ne!(new_batch_id(), new_batch_id());
    }
}
