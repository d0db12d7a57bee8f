//! Declared metadata: schemas, datasets, columns and lineage.
//!
//! Metadata persistence is external. The core reads a [`Catalog`], an
//! arena of datasets addressed by [`DatasetKey`], built once per
//! operation. Lineage edges are plain keys; graphs over them are built by
//! the operation that needs one (dependency order, contract inference)
//! instead of following back-references.
//!
//! ```text
//! Catalog
//!   ├─ schemas   (layer + policy flags)
//!   ├─ datasets  (strategy, natural keys, upstreams, columns)
//!   │    └─ columns (type, system role, former names, column lineage)
//!   └─ query_nodes (hand-authored transforms, see [`query_node`])
//! ```

pub mod query_node;

use crate::sql::types::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use query_node::{Contract, NodeId, QueryGraph, QueryNode, QueryNodeKind};

/// Suffix of generated history datasets.
pub const HIST_SUFFIX: &str = "_hist";

/// Error type for metadata operations.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("dataset '{dataset}' belongs to unknown schema '{schema}'")]
    UnknownSchema { dataset: String, schema: String },

    #[error("dataset '{0}' is declared more than once")]
    DuplicateDataset(String),

    #[error("invalid dataset key '{0}', expected schema.name")]
    InvalidKey(String),

    #[error("unknown query node {0}")]
    UnknownQueryNode(NodeId),

    #[error("cycle detected at {0}")]
    CycleDetected(String),

    #[error("query node {node} has an invalid contract: {}", .issues.join("; "))]
    InvalidContract { node: NodeId, issues: Vec<String> },

    #[error("failed to parse catalog: {0}")]
    Json(#[from] serde_json::Error),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

// ============================================================================
// Keys
// ============================================================================

/// Stable `schema.name` identity of a dataset.
///
/// Ordering is (schema, name), which is also the tie-break order of the
/// dependency resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetKey {
    pub schema: String,
    pub name: String,
}

impl DatasetKey {
    pub fn new(schema: &str, name: &str) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl FromStr for DatasetKey {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('.') {
            Some((schema, name))
                if !schema.is_empty() && !name.is_empty() && !name.contains('.') =>
            {
                Ok(DatasetKey::new(schema, name))
            }
            _ => Err(MetadataError::InvalidKey(s.to_string())),
        }
    }
}

impl TryFrom<String> for DatasetKey {
    type Error = MetadataError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DatasetKey> for String {
    fn from(key: DatasetKey) -> Self {
        key.to_string()
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Logical layer of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Raw,
    Stage,
    /// Technically cleaned core; the only layer with delete detection.
    Rawcore,
    Bizcore,
    Serving,
    #[default]
    #[serde(other)]
    Other,
}

impl Layer {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "raw" => Layer::Raw,
            "stage" | "staging" => Layer::Stage,
            "rawcore" => Layer::Rawcore,
            "bizcore" => Layer::Bizcore,
            "serving" => Layer::Serving,
            _ => Layer::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    /// Falls back to the schema name when omitted.
    #[serde(default)]
    pub layer: Layer,
    /// Datasets of this schema may carry a surrogate key column.
    #[serde(default = "default_true")]
    pub surrogate_keys_enabled: bool,
    #[serde(default)]
    pub default_historize: bool,
    /// Loads are generated from column lineage. When off, every dataset of
    /// the schema loads through an authored query tree.
    #[serde(default = "default_true")]
    pub generate_layer: bool,
}

impl Schema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            layer: Layer::Other,
            surrogate_keys_enabled: true,
            default_historize: false,
            generate_layer: true,
        }
    }

    pub fn layer(&self) -> Layer {
        match self.layer {
            Layer::Other => Layer::from_name(&self.name),
            layer => layer,
        }
    }
}

// ============================================================================
// Dataset
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncrementalStrategy {
    #[default]
    Full,
    Append,
    Merge,
    Snapshot,
    Historize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Materialization {
    #[default]
    Table,
    View,
    Incremental,
    ExternalPassthrough,
}

/// Role of a platform-managed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemRole {
    SurrogateKey,
    BusinessKey,
    ForeignKey,
    LoadRunId,
    LoadedAt,
    RowHash,
    VersionStartedAt,
    VersionEndedAt,
    VersionState,
}

impl SystemRole {
    /// Business-facing roles whose values come from upstream data.
    pub fn is_business(&self) -> bool {
        matches!(self, SystemRole::BusinessKey | SystemRole::ForeignKey)
    }
}

/// Column-level lineage edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnLineage {
    pub upstream: DatasetKey,
    pub column: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub datatype: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub ordinal: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_role: Option<SystemRole>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub former_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surrogate_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lineage: Vec<ColumnLineage>,
}

impl Column {
    pub fn new(name: &str, datatype: &str, ordinal: u32) -> Self {
        Self {
            name: name.to_string(),
            datatype: datatype.to_string(),
            nullable: true,
            ordinal,
            system_role: None,
            former_names: vec![],
            surrogate_expression: None,
            lineage: vec![],
        }
    }

    pub fn with_role(mut self, role: SystemRole) -> Self {
        self.system_role = Some(role);
        self
    }

    pub fn fed_by(mut self, upstream: &DatasetKey, column: &str) -> Self {
        self.lineage.push(ColumnLineage {
            upstream: upstream.clone(),
            column: column.to_string(),
            active: true,
        });
        self
    }

    pub fn data_type(&self) -> Option<DataType> {
        DataType::parse(&self.datatype)
    }

    /// Carries upstream business data rather than a platform value.
    pub fn is_business(&self) -> bool {
        self.system_role.is_none_or(|r| r.is_business())
    }

    /// The active lineage edge from `upstream`, if any.
    pub fn source_in(&self, upstream: &DatasetKey) -> Option<&str> {
        self.lineage
            .iter()
            .find(|l| l.active && &l.upstream == upstream)
            .map(|l| l.column.as_str())
    }
}

/// External object feeding a raw dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(s) => write!(f, "{}:{}.{}", self.system, s, self.table),
            None => write!(f, "{}:{}", self.system, self.table),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: u32,
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub incremental_strategy: IncrementalStrategy,
    #[serde(default)]
    pub materialization: Materialization,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historize: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub natural_key_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub former_names: Vec<String>,
    #[serde(default)]
    pub handle_deletes: bool,
    /// Authored against upstream column names; may use `{{DELTA_CUTOFF}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<DatasetKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_root: Option<NodeId>,
    /// Set on generated `_hist` datasets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hist_of: Option<DatasetKey>,
}

impl Dataset {
    pub fn new(id: u32, schema: &str, name: &str) -> Self {
        Self {
            id,
            schema: schema.to_string(),
            name: name.to_string(),
            incremental_strategy: IncrementalStrategy::Full,
            materialization: Materialization::Table,
            historize: None,
            natural_key_fields: vec![],
            former_names: vec![],
            handle_deletes: false,
            incremental_filter: None,
            upstreams: vec![],
            sources: vec![],
            columns: vec![],
            query_root: None,
            hist_of: None,
        }
    }

    pub fn key(&self) -> DatasetKey {
        DatasetKey::new(&self.schema, &self.name)
    }

    pub fn is_hist(&self) -> bool {
        self.hist_of.is_some()
    }

    /// Columns in ordinal order (declaration order breaks ties).
    pub fn ordered_columns(&self) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self.columns.iter().collect();
        columns.sort_by_key(|c| c.ordinal);
        columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_with_role(&self, role: SystemRole) -> Option<&Column> {
        self.columns.iter().find(|c| c.system_role == Some(role))
    }

    /// Business columns in ordinal order.
    pub fn business_columns(&self) -> Vec<&Column> {
        self.ordered_columns()
            .into_iter()
            .filter(|c| c.is_business())
            .collect()
    }

    /// The upstream a generated load reads from.
    pub fn primary_upstream(&self) -> Option<&DatasetKey> {
        self.upstreams.first()
    }

    /// Lower-cased upstream column name -> this dataset's column name,
    /// over active lineage edges from `upstream`.
    pub fn lineage_map(&self, upstream: &DatasetKey) -> BTreeMap<String, String> {
        self.columns
            .iter()
            .filter_map(|c| {
                c.source_in(upstream)
                    .map(|src| (src.to_ascii_lowercase(), c.name.clone()))
            })
            .collect()
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Serialized form of a catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub schemas: Vec<Schema>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub query_nodes: Vec<QueryNode>,
}

/// Validated, indexed metadata for one operation.
#[derive(Debug, Clone)]
pub struct Catalog {
    schemas: BTreeMap<String, Schema>,
    datasets: Vec<Dataset>,
    index: BTreeMap<DatasetKey, usize>,
    query_nodes: Vec<QueryNode>,
}

impl Catalog {
    /// Validate the document and generate missing `_hist` shadows.
    pub fn new(doc: CatalogDocument) -> MetadataResult<Self> {
        let schemas: BTreeMap<String, Schema> = doc
            .schemas
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();

        let mut catalog = Catalog {
            schemas,
            datasets: vec![],
            index: BTreeMap::new(),
            query_nodes: doc.query_nodes,
        };
        for dataset in doc.datasets {
            catalog.insert(dataset)?;
        }
        catalog.link_query_sources()?;
        catalog.sync_hist_datasets()?;

        for dataset in &catalog.datasets {
            for upstream in &dataset.upstreams {
                if !catalog.index.contains_key(upstream) {
                    return Err(MetadataError::UnknownDataset(format!(
                        "{} (upstream of {})",
                        upstream,
                        dataset.key()
                    )));
                }
            }
        }
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> MetadataResult<Self> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Self::new(doc)
    }

    fn insert(&mut self, dataset: Dataset) -> MetadataResult<()> {
        let key = dataset.key();
        if !self.schemas.contains_key(&dataset.schema) {
            return Err(MetadataError::UnknownSchema {
                dataset: key.to_string(),
                schema: dataset.schema.clone(),
            });
        }
        if self.index.contains_key(&key) {
            return Err(MetadataError::DuplicateDataset(key.to_string()));
        }
        self.index.insert(key, self.datasets.len());
        self.datasets.push(dataset);
        Ok(())
    }

    /// Record every dataset a query tree selects from as an upstream of the
    /// dataset rooted at that tree, after the declared upstreams.
    fn link_query_sources(&mut self) -> MetadataResult<()> {
        let graph = self.query_graph();
        for (node, key) in graph.dataset_references() {
            if !self.index.contains_key(key) {
                return Err(MetadataError::UnknownDataset(format!(
                    "{} (read by query node {})",
                    key, node
                )));
            }
        }
        for dataset in &mut self.datasets {
            let Some(root) = dataset.query_root else {
                continue;
            };
            for source in graph.source_datasets(root) {
                if !dataset.upstreams.contains(&source) {
                    log::debug!("{} reads {} through its query tree", dataset.key(), source);
                    dataset.upstreams.push(source);
                }
            }
        }
        Ok(())
    }

    /// Add a `_hist` dataset for every historizing dataset that lacks one,
    /// and re-derive the columns of existing ones.
    fn sync_hist_datasets(&mut self) -> MetadataResult<()> {
        let bases: Vec<DatasetKey> = self
            .datasets
            .iter()
            .filter(|d| !d.is_hist() && self.wants_history(d))
            .map(Dataset::key)
            .collect();

        for base_key in bases {
            let next_id = self.datasets.iter().map(|d| d.id).max().unwrap_or(0) + 1;
            let base = self.get(&base_key)?;
            let derived = derive_hist_dataset(base, next_id);
            let hist_key = derived.key();

            match self.index.get(&hist_key).copied() {
                Some(i) => {
                    let existing = &mut self.datasets[i];
                    log::debug!("re-syncing history columns of {}", hist_key);
                    existing.columns = derived.columns;
                    existing.natural_key_fields = derived.natural_key_fields;
                    existing.hist_of = derived.hist_of;
                    if !existing.upstreams.contains(&base_key) {
                        existing.upstreams.insert(0, base_key.clone());
                    }
                }
                None => {
                    log::debug!("generating history dataset {}", hist_key);
                    self.insert(derived)?;
                }
            }
        }
        Ok(())
    }

    /// Whether `dataset` keeps an SCD2 history shadow.
    pub fn wants_history(&self, dataset: &Dataset) -> bool {
        let default = self
            .schemas
            .get(&dataset.schema)
            .is_some_and(|s| s.default_historize);
        match dataset.incremental_strategy {
            IncrementalStrategy::Historize => true,
            IncrementalStrategy::Merge => dataset.historize.unwrap_or(default),
            _ => false,
        }
    }

    pub fn get(&self, key: &DatasetKey) -> MetadataResult<&Dataset> {
        self.index
            .get(key)
            .map(|&i| &self.datasets[i])
            .ok_or_else(|| MetadataError::UnknownDataset(key.to_string()))
    }

    pub fn get_by_name(&self, key: &str) -> MetadataResult<&Dataset> {
        self.get(&key.parse()?)
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub fn schema_of(&self, dataset: &Dataset) -> MetadataResult<&Schema> {
        self.schemas
            .get(&dataset.schema)
            .ok_or_else(|| MetadataError::UnknownSchema {
                dataset: dataset.key().to_string(),
                schema: dataset.schema.clone(),
            })
    }

    pub fn datasets(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DatasetKey> {
        self.index.keys()
    }

    /// The `_hist` shadow of `base`, if one exists.
    pub fn hist_of(&self, base: &DatasetKey) -> Option<&Dataset> {
        self.datasets
            .iter()
            .find(|d| d.hist_of.as_ref() == Some(base))
    }

    pub fn query_graph(&self) -> QueryGraph {
        QueryGraph::new(self.query_nodes.iter().cloned())
    }
}

/// Build the SCD2 history dataset paired with `base`.
///
/// Column order: history key, the base business columns in base ordinal
/// order, then row hash, validity bounds, change state and load run id.
pub fn derive_hist_dataset(base: &Dataset, id: u32) -> Dataset {
    let name = format!("{}{}", base.name, HIST_SUFFIX);
    let base_key = base.key();

    let mut columns = vec![Column::new(&format!("{}_key", name), "varchar(64)", 0)
        .with_role(SystemRole::SurrogateKey)];
    for column in base.business_columns() {
        let mut c = Column::new(&column.name, &column.datatype, 0).fed_by(&base_key, &column.name);
        c.system_role = column.system_role;
        c.nullable = column.nullable;
        columns.push(c);
    }
    columns.push(Column::new("row_hash", "varchar(64)", 0).with_role(SystemRole::RowHash));
    let mut started = Column::new("version_started_at", "timestamp", 0)
        .with_role(SystemRole::VersionStartedAt);
    started.nullable = false;
    columns.push(started);
    columns.push(
        Column::new("version_ended_at", "timestamp", 0).with_role(SystemRole::VersionEndedAt),
    );
    columns.push(Column::new("version_state", "varchar(16)", 0).with_role(SystemRole::VersionState));
    columns.push(Column::new("load_run_id", "varchar(64)", 0).with_role(SystemRole::LoadRunId));
    for (i, column) in columns.iter_mut().enumerate() {
        column.ordinal = i as u32 + 1;
    }

    let mut hist = Dataset::new(id, &base.schema, &name);
    hist.incremental_strategy = IncrementalStrategy::Historize;
    hist.natural_key_fields = base.natural_key_fields.clone();
    hist.former_names = base
        .former_names
        .iter()
        .map(|f| format!("{}{}", f, HIST_SUFFIX))
        .collect();
    hist.upstreams = vec![base_key.clone()];
    hist.columns = columns;
    hist.hist_of = Some(base_key);
    hist
}
