//! Dependency manifest for external schedulers.

use super::resolve::DependencyGraph;
use super::OrchestratorResult;
use crate::load::resolve_load_plan;
use crate::metadata::{Catalog, Materialization};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Target,
    Source,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub schema: Option<String>,
    pub dataset: String,
    /// Load mode; absent for sources and for datasets whose plan is invalid.
    pub mode: Option<String>,
    pub materialization: Option<String>,
    pub deps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: DateTime<Utc>,
    pub profile: String,
    pub target_system: String,
    pub nodes: Vec<ManifestNode>,
    /// Kahn levels: nodes of one level only depend on earlier levels.
    pub levels: Vec<Vec<String>>,
}

impl Manifest {
    pub fn to_json(&self) -> OrchestratorResult<String> {
        Ok(serde_json::to_string_pretty(&serde_json::to_value(self)?)?)
    }
}

fn materialization_name(m: Materialization) -> &'static str {
    match m {
        Materialization::Table => "table",
        Materialization::View => "view",
        Materialization::Incremental => "incremental",
        Materialization::ExternalPassthrough => "external_passthrough",
    }
}

/// Manifest over every dataset of `catalog` and the source objects that
/// feed them. Nodes are listed in topological order.
pub fn build_manifest(
    catalog: &Catalog,
    profile: &str,
    target_system: &str,
) -> OrchestratorResult<Manifest> {
    let mut graph: DependencyGraph<String> = DependencyGraph::new();
    let mut nodes: BTreeMap<String, ManifestNode> = BTreeMap::new();

    for dataset in catalog.datasets() {
        let id = dataset.key().to_string();
        let mut deps: Vec<String> = dataset.upstreams.iter().map(|k| k.to_string()).collect();

        for source in &dataset.sources {
            let source_id = format!("source:{}", source);
            deps.push(source_id.clone());
            nodes.entry(source_id.clone()).or_insert_with(|| ManifestNode {
                id: source_id.clone(),
                node_type: NodeType::Source,
                schema: source.schema.clone(),
                dataset: source.table.clone(),
                mode: None,
                materialization: None,
                deps: vec![],
            });
            graph.add_node(source_id);
        }
        deps.sort();
        deps.dedup();

        let mode = match resolve_load_plan(catalog, dataset) {
            Ok(plan) => Some(plan.mode.to_string()),
            Err(err) => {
                log::warn!("manifest: no load mode for {}: {}", id, err);
                None
            }
        };

        graph.add_node(id.clone());
        for dep in &deps {
            graph.add_dependency(id.clone(), dep.clone());
        }
        nodes.insert(
            id.clone(),
            ManifestNode {
                id,
                node_type: NodeType::Target,
                schema: Some(dataset.schema.clone()),
                dataset: dataset.name.clone(),
                mode,
                materialization: Some(materialization_name(dataset.materialization).to_string()),
                deps,
            },
        );
    }

    let levels = graph.levels()?;
    let nodes = levels
        .iter()
        .flatten()
        .filter_map(|id| nodes.remove(id))
        .collect();

    Ok(Manifest {
        generated_at: Utc::now(),
        profile: profile.to_string(),
        target_system: target_system.to_string(),
        nodes,
        levels,
    })
}
