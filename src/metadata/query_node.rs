//! Hand-authored transforms as a tree of query nodes.
//!
//! Nodes live in an arena keyed by [`NodeId`]. A node reads either from an
//! upstream dataset (`select` only) or from its `input_node`; unions read
//! from their branches. [`QueryGraph::infer_contract`] walks the tree
//! bottom-up and reports problems as `ERROR:`-tagged issues instead of
//! failing, so a whole tree can be checked at once. Structural problems
//! (unknown node, cycle) are hard errors.

use super::{Catalog, DatasetKey, MetadataError, MetadataResult};
use crate::sql::expr::{col, func, raw_sql, row_number_over, Expr, SortKey};
use crate::sql::query::{FromSource, QueryPlan, Select, SelectItem, TableRef, UnionMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type NodeId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryNode {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_node: Option<NodeId>,
    #[serde(flatten)]
    pub kind: QueryNodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryNodeKind {
    Select {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<DatasetKey>,
        /// Empty means pass every input column through.
        #[serde(default)]
        columns: Vec<ProjectedColumn>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
    Aggregate {
        group_keys: Vec<String>,
        #[serde(default)]
        measures: Vec<Measure>,
    },
    Union {
        branches: Vec<NodeId>,
        #[serde(default)]
        all: bool,
    },
    Window {
        columns: Vec<WindowColumn>,
    },
}

impl QueryNodeKind {
    fn label(&self) -> &'static str {
        match self {
            QueryNodeKind::Select { .. } => "select",
            QueryNodeKind::Aggregate { .. } => "aggregate",
            QueryNodeKind::Union { .. } => "union",
            QueryNodeKind::Window { .. } => "window",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedColumn {
    pub name: String,
    /// Input column to read; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    /// Trusted SQL fragment; takes precedence over `source_column`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
}

impl ProjectedColumn {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source_column: None,
            expr: None,
        }
    }

    pub fn from_column(name: &str, source: &str) -> Self {
        Self {
            source_column: Some(source.to_string()),
            ..Self::new(name)
        }
    }

    fn source(&self) -> &str {
        self.source_column.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    pub function: String,
    /// `None` aggregates over `*` (only meaningful for COUNT).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

/// `ROW_NUMBER()` window column appended to the input columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowColumn {
    pub name: String,
    #[serde(default)]
    pub partition_by: Vec<String>,
    #[serde(default)]
    pub order_by: Vec<String>,
    #[serde(default)]
    pub descending: bool,
}

/// Ordered output columns of a node plus issues found below it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contract {
    pub columns: Vec<String>,
    pub issues: Vec<String>,
}

impl Contract {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.starts_with("ERROR:"))
    }

    fn error(&mut self, node: NodeId, message: impl std::fmt::Display) {
        self.issues.push(format!("ERROR: node {}: {}", node, message));
    }

    fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }
}

/// Arena of query nodes with lookups built once.
#[derive(Debug, Clone, Default)]
pub struct QueryGraph {
    nodes: BTreeMap<NodeId, QueryNode>,
}

impl QueryGraph {
    pub fn new(nodes: impl IntoIterator<Item = QueryNode>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
        }
    }

    pub fn get(&self, id: NodeId) -> MetadataResult<&QueryNode> {
        self.nodes
            .get(&id)
            .ok_or(MetadataError::UnknownQueryNode(id))
    }

    /// Datasets read anywhere in the tree under `root`, through input
    /// nodes and union branches. Unknown nodes and cycles are left to
    /// [`QueryGraph::infer_contract`] to report.
    pub fn source_datasets(&self, root: NodeId) -> BTreeSet<DatasetKey> {
        let mut sources = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            stack.extend(node.input_node);
            match &node.kind {
                QueryNodeKind::Select {
                    from: Some(key), ..
                } => {
                    sources.insert(key.clone());
                }
                QueryNodeKind::Union { branches, .. } => stack.extend(branches.iter().copied()),
                _ => {}
            }
        }
        sources
    }

    /// Every dataset key named by a `select` node, with the node reading it.
    pub fn dataset_references(&self) -> impl Iterator<Item = (NodeId, &DatasetKey)> {
        self.nodes.values().filter_map(|node| match &node.kind {
            QueryNodeKind::Select {
                from: Some(key), ..
            } => Some((node.id, key)),
            _ => None,
        })
    }

    /// Infer the output contract of `root`.
    pub fn infer_contract(&self, root: NodeId, catalog: &Catalog) -> MetadataResult<Contract> {
        let mut visiting = BTreeSet::new();
        let mut memo = BTreeMap::new();
        self.infer(root, catalog, &mut visiting, &mut memo)
    }

    fn infer(
        &self,
        id: NodeId,
        catalog: &Catalog,
        visiting: &mut BTreeSet<NodeId>,
        memo: &mut BTreeMap<NodeId, Contract>,
    ) -> MetadataResult<Contract> {
        if let Some(done) = memo.get(&id) {
            return Ok(done.clone());
        }
        if !visiting.insert(id) {
            return Err(MetadataError::CycleDetected(format!("query node {}", id)));
        }
        let node = self.get(id)?;

        let input = match node.input_node {
            Some(input) => Some(self.infer(input, catalog, visiting, memo)?),
            None => None,
        };

        let contract = match &node.kind {
            QueryNodeKind::Select { from, columns, .. } => {
                let mut contract = Contract::default();
                let available = match (&input, from) {
                    (Some(input), _) => {
                        contract.issues.extend(input.issues.iter().cloned());
                        Some(input.columns.clone())
                    }
                    (None, Some(key)) => match catalog.get(key) {
                        Ok(dataset) => Some(
                            dataset
                                .ordered_columns()
                                .iter()
                                .map(|c| c.name.clone())
                                .collect(),
                        ),
                        Err(_) => {
                            contract.error(id, format_args!("unknown dataset '{}'", key));
                            None
                        }
                    },
                    (None, None) => {
                        contract.error(id, "select has no input");
                        None
                    }
                };
                let available = Contract {
                    columns: available.unwrap_or_default(),
                    issues: vec![],
                };

                if columns.is_empty() {
                    contract.columns = available.columns.clone();
                }
                for column in columns {
                    if column.expr.is_none() && !available.contains(column.source()) {
                        contract.error(
                            id,
                            format_args!("column '{}' not found in input", column.source()),
                        );
                    }
                    push_output(&mut contract, id, &column.name);
                }
                contract
            }

            QueryNodeKind::Aggregate {
                group_keys,
                measures,
            } => {
                let mut contract = Contract::default();
                let input = require_input(&mut contract, id, node, input);
                for key in group_keys {
                    if !input.contains(key) {
                        contract.error(id, format_args!("group key '{}' not found in input", key));
                    }
                    push_output(&mut contract, id, key);
                }
                for measure in measures {
                    if let Some(column) = &measure.column {
                        if !input.contains(column) {
                            contract.error(
                                id,
                                format_args!(
                                    "measure '{}' reads missing column '{}'",
                                    measure.name, column
                                ),
                            );
                        }
                    }
                    push_output(&mut contract, id, &measure.name);
                }
                contract
            }

            QueryNodeKind::Union { branches, .. } => {
                let mut contract = Contract::default();
                if branches.is_empty() {
                    contract.error(id, "union has no branches");
                }
                let mut expected: Option<(NodeId, Vec<String>)> = None;
                for &branch in branches {
                    let branch_contract = self.infer(branch, catalog, visiting, memo)?;
                    contract.issues.extend(branch_contract.issues.iter().cloned());
                    let normalized: Vec<String> = branch_contract
                        .columns
                        .iter()
                        .map(|c| c.to_ascii_lowercase())
                        .collect();
                    match &expected {
                        None => {
                            contract.columns = branch_contract.columns.clone();
                            expected = Some((branch, normalized));
                        }
                        Some((first, columns)) if *columns != normalized => {
                            contract.error(
                                id,
                                format_args!(
                                    "union branch {} outputs [{}] but branch {} outputs [{}]",
                                    branch,
                                    normalized.join(", "),
                                    first,
                                    columns.join(", ")
                                ),
                            );
                        }
                        Some(_) => {}
                    }
                }
                contract
            }

            QueryNodeKind::Window { columns } => {
                let mut contract = Contract::default();
                let input = require_input(&mut contract, id, node, input);
                contract.columns = input.columns.clone();
                for column in columns {
                    for reference in column.partition_by.iter().chain(&column.order_by) {
                        if !input.contains(reference) {
                            contract.error(
                                id,
                                format_args!(
                                    "window '{}' references missing column '{}'",
                                    column.name, reference
                                ),
                            );
                        }
                    }
                    push_output(&mut contract, id, &column.name);
                }
                contract
            }
        };

        visiting.remove(&id);
        memo.insert(id, contract.clone());
        Ok(contract)
    }

    /// Build the query plan rooted at `root`.
    ///
    /// Fails with [`MetadataError::InvalidContract`] when inference reports
    /// errors, so broken trees never reach SQL rendering.
    pub fn to_plan(&self, root: NodeId, catalog: &Catalog) -> MetadataResult<QueryPlan> {
        let contract = self.infer_contract(root, catalog)?;
        if contract.has_errors() {
            return Err(MetadataError::InvalidContract {
                node: root,
                issues: contract.issues,
            });
        }
        self.plan(root, catalog)
    }

    fn plan(&self, id: NodeId, catalog: &Catalog) -> MetadataResult<QueryPlan> {
        let node = self.get(id)?;
        let source = |input: NodeId| -> MetadataResult<FromSource> {
            Ok(FromSource::subquery(self.plan(input, catalog)?, &alias(input)))
        };

        let plan = match &node.kind {
            QueryNodeKind::Select {
                from,
                columns,
                filter,
            } => {
                let mut select = Select::new();
                select = match (node.input_node, from) {
                    (Some(input), _) => select.from(source(input)?),
                    (None, Some(key)) => {
                        select.from(TableRef::new(Some(&key.schema), &key.name))
                    }
                    (None, None) => select,
                };
                if columns.is_empty() {
                    select = select.item(Expr::Star { table: None });
                }
                for column in columns {
                    let item = match &column.expr {
                        Some(expr) => SelectItem::aliased(raw_sql(expr), &column.name),
                        None if column.source() == column.name => {
                            SelectItem::new(col(&column.name))
                        }
                        None => SelectItem::aliased(col(column.source()), &column.name),
                    };
                    select = select.item(item);
                }
                if let Some(filter) = filter {
                    select = select.filter(raw_sql(filter));
                }
                QueryPlan::Select(select)
            }

            QueryNodeKind::Aggregate {
                group_keys,
                measures,
            } => {
                let input = node.input_node.ok_or(MetadataError::UnknownQueryNode(id))?;
                let keys: Vec<Expr> = group_keys.iter().map(|k| col(k)).collect();
                let mut select = Select::new().from(source(input)?);
                select = select.items(keys.iter().cloned().map(SelectItem::new));
                for measure in measures {
                    let arg = match &measure.column {
                        Some(column) => col(column),
                        None => Expr::Star { table: None },
                    };
                    select = select.item(SelectItem::aliased(
                        func(&measure.function, vec![arg]),
                        &measure.name,
                    ));
                }
                QueryPlan::Select(select.group_by(keys))
            }

            QueryNodeKind::Union { branches, all } => {
                let mut selects = Vec::with_capacity(branches.len());
                for &branch in branches {
                    selects.push(match self.plan(branch, catalog)? {
                        QueryPlan::Select(select) => select,
                        nested => Select::new()
                            .item(Expr::Star { table: None })
                            .from(FromSource::subquery(nested, &alias(branch))),
                    });
                }
                let mode = if *all { UnionMode::All } else { UnionMode::Distinct };
                QueryPlan::Union { selects, mode }
            }

            QueryNodeKind::Window { columns } => {
                let input = node.input_node.ok_or(MetadataError::UnknownQueryNode(id))?;
                let mut select = Select::new()
                    .item(Expr::Star { table: Some(alias(input)) })
                    .from(source(input)?);
                for column in columns {
                    let order_by = column
                        .order_by
                        .iter()
                        .map(|c| {
                            if column.descending {
                                SortKey::desc(col(c))
                            } else {
                                SortKey::asc(col(c))
                            }
                        })
                        .collect();
                    let partition_by = column.partition_by.iter().map(|c| col(c)).collect();
                    select = select.item(SelectItem::aliased(
                        row_number_over(partition_by, order_by),
                        &column.name,
                    ));
                }
                QueryPlan::Select(select)
            }
        };
        log::debug!("planned {} node {}", node.kind.label(), id);
        Ok(plan)
    }
}

fn alias(id: NodeId) -> String {
    format!("n{}", id)
}

fn push_output(contract: &mut Contract, id: NodeId, name: &str) {
    if contract.contains(name) {
        contract.error(id, format_args!("duplicate output column '{}'", name));
    } else {
        contract.columns.push(name.to_string());
    }
}

fn require_input(
    contract: &mut Contract,
    id: NodeId,
    node: &QueryNode,
    input: Option<Contract>,
) -> Contract {
    match input {
        Some(input) => {
            contract.issues.extend(input.issues.iter().cloned());
            input
        }
        None => {
            contract.error(
                id,
                format_args!("{} requires an input node", node.kind.label()),
            );
            Contract::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CatalogDocument, Column, Dataset, Schema};
    use crate::sql::{render_select, Dialect};

    fn catalog(nodes: Vec<QueryNode>) -> Catalog {
        let mut orders = Dataset::new(1, "stage", "stg_order");
        orders.columns = vec![
            Column::new("order_id", "int", 1),
            Column::new("customer_id", "int", 2),
            Column::new("amount", "decimal(18,2)", 3),
        ];
        let mut returns = Dataset::new(2, "stage", "stg_return");
        returns.columns = vec![
            Column::new("order_id", "int", 1),
            Column::new("customer_id", "int", 2),
        ];
        Catalog::new(CatalogDocument {
            schemas: vec![Schema::new("stage")],
            datasets: vec![orders, returns],
            query_nodes: nodes,
        })
        .unwrap()
    }

    fn select(id: NodeId, from: &str, columns: &[&str]) -> QueryNode {
        QueryNode {
            id,
            input_node: None,
            kind: QueryNodeKind::Select {
                from: Some(from.parse().unwrap()),
                columns: columns.iter().map(|c| ProjectedColumn::new(c)).collect(),
                filter: None,
            },
        }
    }

    #[test]
    fn test_select_contract() {
        let cat = catalog(vec![select(1, "stage.stg_order", &["order_id", "amount"])]);
        let contract = cat.query_graph().infer_contract(1, &cat).unwrap();
        assert_eq!(contract.columns, vec!["order_id", "amount"]);
        assert!(!contract.has_errors());
    }

    #[test]
    fn test_renamed_projection() {
        let mut node = select(1, "stage.stg_order", &["order_id"]);
        if let QueryNodeKind::Select { columns, .. } = &mut node.kind {
            columns.push(ProjectedColumn::from_column("total", "amount"));
        }
        let cat = catalog(vec![node]);
        let contract = cat.query_graph().infer_contract(1, &cat).unwrap();
        assert_eq!(contract.columns, vec!["order_id", "total"]);
        assert!(!contract.has_errors());
    }

    #[test]
    fn test_missing_column_is_error_issue() {
        let cat = catalog(vec![select(1, "stage.stg_order", &["order_id", "nope"])]);
        let contract = cat.query_graph().infer_contract(1, &cat).unwrap();
        assert!(contract.has_errors());
        assert_eq!(
            contract.issues,
            vec!["ERROR: node 1: column 'nope' not found in input"]
        );
    }

    #[test]
    fn test_union_divergence_reported() {
        let cat = catalog(vec![
            select(1, "stage.stg_order", &["order_id", "customer_id"]),
            select(2, "stage.stg_return", &["customer_id", "order_id"]),
            QueryNode {
                id: 3,
                input_node: None,
                kind: QueryNodeKind::Union {
                    branches: vec![1, 2],
                    all: true,
                },
            },
        ]);
        let contract = cat.query_graph().infer_contract(3, &cat).unwrap();
        assert!(contract.has_errors());
        assert!(contract.issues[0].starts_with("ERROR: node 3: union branch 2"));
        assert!(matches!(
            cat.query_graph().to_plan(3, &cat),
            Err(MetadataError::InvalidContract { node: 3, .. })
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let cat = catalog(vec![
            QueryNode {
                id: 1,
                input_node: Some(2),
                kind: QueryNodeKind::Window { columns: vec![] },
            },
            QueryNode {
                id: 2,
                input_node: Some(1),
                kind: QueryNodeKind::Aggregate {
                    group_keys: vec![],
                    measures: vec![],
                },
            },
        ]);
        let err = cat.query_graph().infer_contract(1, &cat).unwrap_err();
        assert!(matches!(err, MetadataError::CycleDetected(ref node) if node == "query node 1"));
    }

    #[test]
    fn test_unknown_node() {
        let cat = catalog(vec![]);
        assert!(matches!(
            cat.query_graph().infer_contract(9, &cat),
            Err(MetadataError::UnknownQueryNode(9))
        ));
    }

    #[test]
    fn test_aggregate_plan() {
        let cat = catalog(vec![
            select(1, "stage.stg_order", &["customer_id", "amount"]),
            QueryNode {
                id: 2,
                input_node: Some(1),
                kind: QueryNodeKind::Aggregate {
                    group_keys: vec!["customer_id".into()],
                    measures: vec![Measure {
                        name: "total".into(),
                        function: "sum".into(),
                        column: Some("amount".into()),
                    }],
                },
            },
        ]);
        let graph = cat.query_graph();
        assert_eq!(
            graph.infer_contract(2, &cat).unwrap().columns,
            vec!["customer_id", "total"]
        );
        let sql = render_select(&graph.to_plan(2, &cat).unwrap(), Dialect::Postgres).unwrap();
        assert!(sql.starts_with("SELECT \"customer_id\", SUM(\"amount\") AS \"total\"\nFROM (\n"));
        assert!(sql.contains(") AS \"n1\""));
        assert!(sql.ends_with("GROUP BY \"customer_id\""));
    }

    #[test]
    fn test_window_requires_input() {
        let cat = catalog(vec![QueryNode {
            id: 1,
            input_node: None,
            kind: QueryNodeKind::Window {
                columns: vec![WindowColumn {
                    name: "rn".into(),
                    partition_by: vec![],
                    order_by: vec![],
                    descending: false,
                }],
            },
        }]);
        let contract = cat.query_graph().infer_contract(1, &cat).unwrap();
        assert_eq!(
            contract.issues[0],
            "ERROR: node 1: window requires an input node"
        );
    }

    #[test]
    fn test_source_datasets_follow_inputs_and_branches() {
        let cat = catalog(vec![
            select(1, "stage.stg_order", &["order_id", "customer_id"]),
            select(2, "stage.stg_return", &["order_id", "customer_id"]),
            QueryNode {
                id: 3,
                input_node: None,
                kind: QueryNodeKind::Union {
                    branches: vec![1, 2],
                    all: true,
                },
            },
            QueryNode {
                id: 4,
                input_node: Some(3),
                kind: QueryNodeKind::Window { columns: vec![] },
            },
        ]);
        let graph = cat.query_graph();
        assert_eq!(
            graph.source_datasets(4).into_iter().collect::<Vec<_>>(),
            vec![
                DatasetKey::new("stage", "stg_order"),
                DatasetKey::new("stage", "stg_return"),
            ]
        );
        assert_eq!(graph.source_datasets(1).len(), 1);
        assert!(graph.source_datasets(99).is_empty());
    }

    #[test]
    fn test_query_node_json() {
        let node: QueryNode = serde_json::from_str(
            r#"{"id": 4, "input_node": 3, "kind": "window",
                "columns": [{"name": "rn", "partition_by": ["customer_id"], "order_by": ["order_id"], "descending": true}]}"#,
        )
        .unwrap();
        assert_eq!(node.input_node, Some(3));
        assert!(matches!(node.kind, QueryNodeKind::Window { ref columns } if columns[0].descending));
    }
}
