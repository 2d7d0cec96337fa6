//! Executes a query layer against a data source and gathers related records.

mod memory;
mod postgres;

pub use memory::InMemoryDataSource;
pub use postgres::PgDataSource;

use crate::error::DataAccessError;
use crate::graph::{AttrType, Attribute, ResourceGraph, ResourceType, SortDirection};
use crate::query::{FieldChain, FilterExpression, Hop, Literal, QueryLayer, SortKey};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A materialized row keyed by column name.
pub type Record = serde_json::Map<String, Value>;

/// Rows to skip and take, in the store's ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Window {
    pub skip: u64,
    /// None = no limit.
    pub take: Option<u32>,
}

/// One store round trip: filtered, ordered, windowed rows of a single resource type.
#[derive(Clone, Debug)]
pub struct StoreQuery {
    pub resource: Arc<ResourceType>,
    pub filter: Option<FilterExpression>,
    pub sort: Vec<SortKey>,
    pub window: Window,
    /// Columns every returned record must carry.
    pub columns: Vec<String>,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, query: &StoreQuery) -> Result<Vec<Record>, DataAccessError>;

    /// Number of rows matching `filter`, ignoring any window.
    async fn count(&self, resource: &ResourceType, filter: Option<&FilterExpression>) -> Result<u64, DataAccessError>;

    async fn ping(&self) -> Result<(), DataAccessError> {
        Ok(())
    }
}

/// Records loaded for one relationship path, grouped by the owning record's identity.
#[derive(Clone, Debug)]
pub struct RelatedSet {
    pub resource: Arc<ResourceType>,
    pub relationship: crate::graph::Relationship,
    /// Every owner appears, with an empty list when nothing is related.
    pub by_owner: HashMap<String, Vec<Record>>,
}

#[derive(Clone, Debug)]
pub struct MaterializedPage {
    pub resource: Arc<ResourceType>,
    pub records: Vec<Record>,
    /// Keyed by relationship path from the root, e.g. "comments" or "comments.author".
    pub related: BTreeMap<String, RelatedSet>,
    pub total_count: Option<u64>,
}

impl MaterializedPage {
    pub fn related(&self, path: &str) -> Option<&RelatedSet> {
        self.related.get(path)
    }
}

/// Identity of a record as it appears in documents.
pub fn record_id(resource: &ResourceType, record: &Record) -> Option<String> {
    record.get(&resource.id_column).and_then(key_string)
}

/// Stringified join/identity value; None for null or composite values.
pub(crate) fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Drop the in-flight store call when the request is cancelled.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, DataAccessError>
where
    F: Future<Output = Result<T, DataAccessError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DataAccessError::Cancelled),
        result = fut => result,
    }
}

struct LoadStep {
    path: String,
    /// None = the root records own this step.
    owner_path: Option<String>,
    owner: Arc<ResourceType>,
    hop: Hop,
}

/// Owner keys sent in one eager-load query; PostgreSQL caps a statement at 65535 binds.
pub const DEFAULT_KEY_BATCH: usize = 10_000;

pub struct Repository {
    graph: Arc<ResourceGraph>,
    key_batch: usize,
}

impl Repository {
    pub fn new(graph: Arc<ResourceGraph>) -> Self {
        Repository {
            graph,
            key_batch: DEFAULT_KEY_BATCH,
        }
    }

    /// Split eager loads into queries of at most `size` owner keys.
    pub fn with_key_batch(mut self, size: usize) -> Self {
        self.key_batch = size.max(1);
        self
    }

    pub async fn execute(
        &self,
        layer: &QueryLayer,
        source: &dyn DataSource,
        cancel: &CancellationToken,
    ) -> Result<MaterializedPage, DataAccessError> {
        let root = &layer.resource;
        let mut sort = layer.sort.keys.clone();
        let has_id_key = sort
            .iter()
            .any(|k| k.field.hops.is_empty() && k.field.attribute.column == root.id_column);
        if !has_id_key {
            sort.push(SortKey {
                field: FieldChain::attribute(root.id_attribute()),
                direction: SortDirection::Ascending,
            });
        }
        let query = StoreQuery {
            resource: root.clone(),
            filter: layer.filter.clone(),
            sort,
            window: Window {
                skip: layer.pagination.skip(),
                take: layer.pagination.take(),
            },
            columns: root.stored_columns(),
        };

        let fetch = source.fetch(&query);
        let count = async {
            if layer.include_total_count {
                source.count(root, layer.filter.as_ref()).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let (records, total_count) = cancellable(cancel, async { tokio::try_join!(fetch, count) }).await?;

        let mut related = BTreeMap::new();
        for step in self.plan(layer)? {
            let set = {
                let owners: Vec<&Record> = match &step.owner_path {
                    None => records.iter().collect(),
                    Some(path) => owner_records(&related, path),
                };
                load_step(&step, &owners, self.key_batch, source, cancel).await?
            };
            related.insert(step.path, set);
        }

        tracing::debug!(
            resource = %root.public_name,
            records = records.len(),
            related = related.len(),
            total = ?total_count,
            "page materialized"
        );
        Ok(MaterializedPage {
            resource: root.clone(),
            records,
            related,
            total_count,
        })
    }

    /// Root relationships whose linkage the owner row cannot give, then every prefix of every inclusion chain.
    fn plan(&self, layer: &QueryLayer) -> Result<Vec<LoadStep>, DataAccessError> {
        let root = &layer.resource;
        let mut steps: Vec<LoadStep> = Vec::new();
        let mut planned = HashSet::new();
        for relationship in &root.relationships {
            let target = self
                .graph
                .target_of(relationship)
                .map_err(|e| DataAccessError::Unavailable(e.to_string()))?;
            let from_foreign_key = !relationship.is_to_many()
                && relationship.our_key != root.id_column
                && relationship.their_key == target.id_column;
            if from_foreign_key {
                continue;
            }
            planned.insert(relationship.public_name.clone());
            steps.push(LoadStep {
                path: relationship.public_name.clone(),
                owner_path: None,
                owner: root.clone(),
                hop: Hop {
                    relationship: relationship.clone(),
                    target,
                },
            });
        }
        for chain in &layer.includes {
            for (i, hop) in chain.hops.iter().enumerate() {
                let path = chain.path(i + 1);
                if !planned.insert(path.clone()) {
                    continue;
                }
                let (owner_path, owner) = match i {
                    0 => (None, root.clone()),
                    _ => (Some(chain.path(i)), chain.hops[i - 1].target.clone()),
                };
                steps.push(LoadStep {
                    path,
                    owner_path,
                    owner,
                    hop: hop.clone(),
                });
            }
        }
        Ok(steps)
    }
}

/// Distinct records across every owner of a loaded path.
fn owner_records<'r>(related: &'r BTreeMap<String, RelatedSet>, path: &str) -> Vec<&'r Record> {
    let Some(set) = related.get(path) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut owners = Vec::new();
    for record in set.by_owner.values().flatten() {
        if let Some(id) = record_id(&set.resource, record) {
            if seen.insert(id) {
                owners.push(record);
            }
        }
    }
    owners
}

async fn load_step(
    step: &LoadStep,
    owners: &[&Record],
    key_batch: usize,
    source: &dyn DataSource,
    cancel: &CancellationToken,
) -> Result<RelatedSet, DataAccessError> {
    let relationship = &step.hop.relationship;
    let target = &step.hop.target;

    // owner key value -> owner ids sharing it
    let mut owners_by_key: HashMap<String, Vec<String>> = HashMap::new();
    let mut by_owner: HashMap<String, Vec<Record>> = HashMap::new();
    let mut key_values = Vec::new();
    for owner in owners {
        let Some(owner_id) = record_id(&step.owner, owner) else {
            continue;
        };
        by_owner.entry(owner_id.clone()).or_default();
        let Some(value) = owner.get(&relationship.our_key) else {
            continue;
        };
        let Some(key) = key_string(value) else {
            continue;
        };
        let ids = owners_by_key.entry(key).or_insert_with(|| {
            key_values.push(value.clone());
            Vec::new()
        });
        if !ids.contains(&owner_id) {
            ids.push(owner_id);
        }
    }

    let key_type = key_type(&step.owner, &relationship.our_key);
    let key_attribute = key_attribute(target, &relationship.their_key, key_type);
    let mut columns = target.stored_columns();
    if !columns.contains(&relationship.their_key) {
        columns.push(relationship.their_key.clone());
    }
    // each owner has one key, so its rows all come back in one batch
    for batch in key_values.chunks(key_batch) {
        let values = batch
            .iter()
            .map(|v| key_literal(v, key_attribute.attr_type))
            .collect();
        let query = StoreQuery {
            resource: target.clone(),
            filter: Some(FilterExpression::Any {
                field: FieldChain::attribute(key_attribute.clone()),
                values,
            }),
            sort: vec![SortKey {
                field: FieldChain::attribute(target.id_attribute()),
                direction: SortDirection::Ascending,
            }],
            window: Window::default(),
            columns: columns.clone(),
        };
        let rows = cancellable(cancel, source.fetch(&query)).await?;
        tracing::debug!(path = %step.path, keys = batch.len(), rows = rows.len(), "related records loaded");
        for row in rows {
            let Some(key) = row.get(&relationship.their_key).and_then(key_string) else {
                continue;
            };
            if let Some(ids) = owners_by_key.get(&key) {
                for id in ids {
                    by_owner.entry(id.clone()).or_default().push(row.clone());
                }
            }
        }
    }

    Ok(RelatedSet {
        resource: target.clone(),
        relationship: relationship.clone(),
        by_owner,
    })
}

fn key_type(owner: &ResourceType, column: &str) -> AttrType {
    if column == owner.id_column {
        return owner.id_type.attr_type();
    }
    owner
        .attributes
        .iter()
        .find(|a| a.column == column)
        .map(|a| a.attr_type)
        .unwrap_or(AttrType::Integer)
}

/// The target column matched against owner keys, addressable by stores even when not exposed.
fn key_attribute(target: &ResourceType, column: &str, fallback: AttrType) -> Attribute {
    if column == target.id_column {
        return target.id_attribute();
    }
    target
        .attributes
        .iter()
        .find(|a| a.column == column)
        .cloned()
        .unwrap_or_else(|| Attribute::key_column(column, fallback))
}

fn key_literal(value: &Value, attr_type: AttrType) -> Literal {
    match value {
        Value::String(s) => Literal::parse(s, attr_type).unwrap_or_else(|_| Literal::String(s.clone())),
        other => Literal::from_json(other),
    }
}
