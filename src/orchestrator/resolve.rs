//! Dependency resolution.
//!
//! Edges run from upstream to downstream, so a topological order lists
//! dependencies first. Both the order and the level sets are computed
//! with Kahn's algorithm over a sorted ready set, which makes ties break
//! on the node ordering: `(schema, name)` for dataset keys.

use super::{OrchestratorError, OrchestratorResult};
use crate::metadata::{Catalog, Dataset, DatasetKey};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

/// A directed dependency graph over ordered node ids.
#[derive(Debug, Clone)]
pub struct DependencyGraph<K: Ord + Clone + Display> {
    graph: DiGraph<K, ()>,
    nodes: BTreeMap<K, NodeIndex>,
}

impl<K: Ord + Clone + Display> Default for DependencyGraph<K> {
    fn default() -> Self {
        Self {
            graph: DiGraph::new(),
            nodes: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone + Display> DependencyGraph<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: K) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.nodes.insert(id, idx);
        idx
    }

    /// `downstream` depends on `upstream`.
    pub fn add_dependency(&mut self, downstream: K, upstream: K) {
        let to = self.add_node(downstream);
        let from = self.add_node(upstream);
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
    }

    pub fn contains(&self, id: &K) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate upstreams of `id`, sorted.
    pub fn upstreams(&self, id: &K) -> Vec<K> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Immediate downstreams of `id`, sorted.
    pub fn downstreams(&self, id: &K) -> Vec<K> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &K, direction: Direction) -> Vec<K> {
        let Some(&idx) = self.nodes.get(id) else {
            return vec![];
        };
        let found: BTreeSet<K> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| match direction {
                Direction::Incoming => self.graph[e.source()].clone(),
                Direction::Outgoing => self.graph[e.target()].clone(),
            })
            .collect();
        found.into_iter().collect()
    }

    /// `roots` plus everything they transitively depend on.
    pub fn closure(&self, roots: &[K]) -> BTreeSet<K> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<K> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            stack.extend(self.upstreams(&id));
        }
        seen
    }

    /// Topological order over all nodes; ties break on node ordering.
    pub fn order(&self) -> OrchestratorResult<Vec<K>> {
        self.order_of(&self.nodes.keys().cloned().collect())
    }

    /// Topological order restricted to `members`. Edges to nodes outside
    /// `members` are ignored.
    pub fn order_of(&self, members: &BTreeSet<K>) -> OrchestratorResult<Vec<K>> {
        let mut indegree = self.indegrees(members);
        let mut ready: BTreeSet<K> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(k, _)| k.clone())
            .collect();

        let mut order = Vec::with_capacity(members.len());
        while let Some(id) = ready.pop_first() {
            for next in self.downstreams(&id) {
                if let Some(d) = indegree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(next);
                    }
                }
            }
            order.push(id);
        }

        if order.len() < members.len() {
            return Err(self.cycle_error(members, &order));
        }
        Ok(order)
    }

    /// Kahn level sets: every node of level `n` depends only on nodes of
    /// earlier levels. Each level is sorted.
    pub fn levels(&self) -> OrchestratorResult<Vec<Vec<K>>> {
        self.levels_of(&self.nodes.keys().cloned().collect())
    }

    pub fn levels_of(&self, members: &BTreeSet<K>) -> OrchestratorResult<Vec<Vec<K>>> {
        let mut indegree = self.indegrees(members);
        let mut current: BTreeSet<K> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(k, _)| k.clone())
            .collect();

        let mut levels = vec![];
        let mut placed = vec![];
        while !current.is_empty() {
            let mut next = BTreeSet::new();
            for id in &current {
                for down in self.downstreams(id) {
                    if let Some(d) = indegree.get_mut(&down) {
                        *d -= 1;
                        if *d == 0 {
                            next.insert(down);
                        }
                    }
                }
            }
            let level: Vec<K> = current.into_iter().collect();
            placed.extend(level.iter().cloned());
            levels.push(level);
            current = next;
        }

        if placed.len() < members.len() {
            return Err(self.cycle_error(members, &placed));
        }
        Ok(levels)
    }

    fn indegrees(&self, members: &BTreeSet<K>) -> BTreeMap<K, usize> {
        members
            .iter()
            .filter(|id| self.contains(id))
            .map(|id| {
                let d = self
                    .upstreams(id)
                    .iter()
                    .filter(|u| members.contains(*u))
                    .count();
                (id.clone(), d)
            })
            .collect()
    }

    /// Walk upstream from the smallest unplaced node until a node repeats.
    fn cycle_error(&self, members: &BTreeSet<K>, placed: &[K]) -> OrchestratorError {
        let placed: BTreeSet<&K> = placed.iter().collect();
        let stuck: BTreeSet<&K> = members.iter().filter(|k| !placed.contains(k)).collect();

        let Some(&start) = stuck.first() else {
            return OrchestratorError::CycleDetected(String::new());
        };
        let mut path = vec![start.clone()];
        let mut visited = BTreeSet::from([start.clone()]);
        let mut current = start.clone();
        while let Some(up) = self
            .upstreams(&current)
            .into_iter()
            .find(|u| stuck.contains(u))
        {
            path.push(up.clone());
            if !visited.insert(up.clone()) {
                break;
            }
            current = up;
        }
        // Walked against the edges; report in dependency order.
        path.reverse();
        let rendered: Vec<String> = path.iter().map(|k| k.to_string()).collect();
        OrchestratorError::CycleDetected(rendered.join(" -> "))
    }
}

impl DependencyGraph<DatasetKey> {
    /// Dataset graph of a catalog: one edge per upstream. Datasets read
    /// through a query tree are upstreams too, see [`Catalog::new`].
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut graph = Self::new();
        for dataset in catalog.datasets() {
            graph.add_node(dataset.key());
            for upstream in &dataset.upstreams {
                graph.add_dependency(dataset.key(), upstream.clone());
            }
        }
        graph
    }
}

/// Datasets to load for `roots`, dependencies first.
///
/// The selection is the roots, their transitive upstreams, and the `_hist`
/// shadow of every selected base (a base is never loaded without its
/// history). Empty `roots` selects the whole catalog.
pub fn resolve_order<'a>(
    catalog: &'a Catalog,
    roots: &[DatasetKey],
) -> OrchestratorResult<Vec<&'a Dataset>> {
    let graph = DependencyGraph::from_catalog(catalog);
    for root in roots {
        if !graph.contains(root) {
            return Err(OrchestratorError::UnknownDataset(root.to_string()));
        }
    }

    let mut members = if roots.is_empty() {
        catalog.keys().cloned().collect()
    } else {
        graph.closure(roots)
    };
    let shadows: Vec<DatasetKey> = members
        .iter()
        .filter_map(|k| catalog.hist_of(k).map(Dataset::key))
        .collect();
    // A shadow's only upstream is its base, already selected.
    members.extend(shadows);

    let order = graph.order_of(&members)?;
    log::debug!("resolved {} dataset(s) for {} root(s)", order.len(), roots.len());
    order
        .iter()
        .map(|k| catalog.get(k).map_err(OrchestratorError::from))
        .collect()
}
