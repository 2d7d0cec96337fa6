//! Materialized page + query layer -> JSON:API document.

use super::*;
use crate::config::ApiOptions;
use crate::definition::ResourceDefinitions;
use crate::error::SerializationError;
use crate::graph::{Relationship, ResourceGraph, ResourceType};
use crate::query::QueryLayer;
use crate::repository::{key_string, record_id, MaterializedPage, Record, RelatedSet};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Path and query string of the incoming request, used to build top-level links.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestLinks {
    /// e.g. "/articles"
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl RequestLinks {
    pub fn new(path: impl Into<String>, params: &[(String, String)]) -> Self {
        RequestLinks {
            path: path.into(),
            params: params.to_vec(),
        }
    }

    /// Request URL; with `page` = (number, size) the pagination parameters are replaced.
    fn url(&self, base_url: &str, page: Option<(u32, u32)>) -> String {
        let mut pairs: Vec<(String, String)> = match page {
            Some(_) => self
                .params
                .iter()
                .filter(|(k, _)| k != "page[number]" && k != "page[size]")
                .cloned()
                .collect(),
            None => self.params.clone(),
        };
        if let Some((number, size)) = page {
            pairs.push(("page[number]".to_string(), number.to_string()));
            pairs.push(("page[size]".to_string(), size.to_string()));
        }
        let mut url = format!("{}{}", base_url, self.path);
        if !pairs.is_empty() {
            let query: Vec<String> = pairs
                .iter()
                .map(|(k, v)| {
                    let key = urlencoding::encode(k).replace("%5B", "[").replace("%5D", "]");
                    format!("{}={}", key, urlencoding::encode(v))
                })
                .collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }
}

pub struct DocumentSerializer {
    graph: Arc<ResourceGraph>,
    base_url: String,
    definitions: ResourceDefinitions,
}

impl DocumentSerializer {
    pub fn new(graph: Arc<ResourceGraph>, options: &ApiOptions) -> Self {
        DocumentSerializer {
            graph,
            base_url: options.base_url.clone(),
            definitions: ResourceDefinitions::default(),
        }
    }

    pub fn with_definitions(mut self, definitions: ResourceDefinitions) -> Self {
        self.definitions = definitions;
        self
    }

    /// Collection document: `data` is an array, with pagination links and `meta.total` when counted.
    pub fn serialize(
        &self,
        page: &MaterializedPage,
        layer: &QueryLayer,
        request: &RequestLinks,
    ) -> Result<Document, SerializationError> {
        let data = page
            .records
            .iter()
            .map(|r| self.resource_object(&page.resource, r, "", page, layer))
            .collect::<Result<Vec<_>, _>>()?;
        let included = self.included(&data, &page.records, page, layer)?;
        let mut meta = Map::new();
        if let Some(total) = page.total_count {
            meta.insert("total".to_string(), Value::from(total));
        }
        Ok(Document {
            links: self.top_links(request, layer, page.records.len(), page.total_count),
            data: PrimaryData::Many(data),
            included,
            meta,
            jsonapi: JsonApiObject::default(),
        })
    }

    /// Single-resource document: `data` is the first record or null.
    pub fn serialize_single(
        &self,
        page: &MaterializedPage,
        layer: &QueryLayer,
        request: &RequestLinks,
    ) -> Result<Document, SerializationError> {
        let roots = &page.records[..page.records.len().min(1)];
        let data = roots
            .iter()
            .map(|r| self.resource_object(&page.resource, r, "", page, layer))
            .collect::<Result<Vec<_>, _>>()?;
        let included = self.included(&data, roots, page, layer)?;
        Ok(Document {
            data: PrimaryData::One(data.into_iter().next()),
            included,
            meta: Map::new(),
            links: TopLevelLinks {
                self_link: request.url(&self.base_url, None),
                ..TopLevelLinks::default()
            },
            jsonapi: JsonApiObject::default(),
        })
    }

    fn resource_object(
        &self,
        resource: &ResourceType,
        record: &Record,
        path: &str,
        page: &MaterializedPage,
        layer: &QueryLayer,
    ) -> Result<ResourceObject, SerializationError> {
        let id = record_id(resource, record).ok_or_else(|| {
            tracing::error!(
                resource = %resource.public_name,
                path = %path,
                id_column = %resource.id_column,
                record = ?record,
                "record has no identity"
            );
            SerializationError {
                resource: resource.public_name.clone(),
                message: format!("record is missing identity column '{}'", resource.id_column),
            }
        })?;
        let self_link = format!("{}/{}/{}", self.base_url, resource.public_name, urlencoding::encode(&id));

        let attributes = resource
            .attributes
            .iter()
            .filter(|a| layer.fields.allows(&resource.public_name, &a.public_name))
            .map(|a| (a.public_name.clone(), record.get(&a.column).cloned().unwrap_or(Value::Null)))
            .collect();

        let mut relationships = BTreeMap::new();
        for relationship in &resource.relationships {
            let child = match path {
                "" => relationship.public_name.clone(),
                _ => format!("{}.{}", path, relationship.public_name),
            };
            let data = self.linkage(resource, relationship, record, &id, page.related(&child));
            relationships.insert(
                relationship.public_name.clone(),
                RelationshipObject {
                    links: RelationshipLinks {
                        self_link: format!("{}/relationships/{}", self_link, relationship.public_name),
                        related: format!("{}/{}", self_link, relationship.public_name),
                    },
                    data,
                },
            );
        }

        let meta = self
            .definitions
            .get(&resource.public_name)
            .and_then(|d| d.get_meta(resource, record));

        Ok(ResourceObject {
            resource_type: resource.public_name.clone(),
            id,
            attributes,
            relationships,
            links: ResourceLinks { self_link },
            meta,
        })
    }

    /// Loaded sets give full linkage; otherwise to-one linkage comes from the owner's foreign key.
    fn linkage(
        &self,
        owner: &ResourceType,
        relationship: &Relationship,
        record: &Record,
        owner_id: &str,
        loaded: Option<&RelatedSet>,
    ) -> Option<Linkage> {
        if let Some(set) = loaded {
            let identifiers: Vec<ResourceIdentifier> = set
                .by_owner
                .get(owner_id)?
                .iter()
                .filter_map(|r| {
                    record_id(&set.resource, r).map(|id| ResourceIdentifier {
                        resource_type: set.resource.public_name.clone(),
                        id,
                    })
                })
                .collect();
            return Some(if relationship.is_to_many() {
                Linkage::ToMany(identifiers)
            } else {
                Linkage::ToOne(identifiers.into_iter().next())
            });
        }
        if relationship.is_to_many() || relationship.our_key == owner.id_column {
            return None;
        }
        let target = self.graph.resolve(&relationship.target).ok()?;
        if relationship.their_key != target.id_column {
            return None;
        }
        let value = record.get(&relationship.our_key)?;
        Some(Linkage::ToOne(key_string(value).map(|id| ResourceIdentifier {
            resource_type: target.public_name.clone(),
            id,
        })))
    }

    /// Walk each inclusion chain from the primary records. A resource reached again under
    /// another path is emitted once and gains the linkage loaded there.
    fn included(
        &self,
        primary: &[ResourceObject],
        roots: &[Record],
        page: &MaterializedPage,
        layer: &QueryLayer,
    ) -> Result<Vec<ResourceObject>, SerializationError> {
        let primary_ids: HashSet<ResourceIdentifier> = primary.iter().map(ResourceObject::identifier).collect();
        let mut positions: HashMap<ResourceIdentifier, usize> = HashMap::new();
        let mut included: Vec<ResourceObject> = Vec::new();
        for chain in &layer.includes {
            let mut owners: Vec<(&ResourceType, &Record)> = roots.iter().map(|r| (page.resource.as_ref(), r)).collect();
            for depth in 1..=chain.hops.len() {
                let path = chain.path(depth);
                let Some(set) = page.related(&path) else {
                    break;
                };
                let mut next: Vec<(&ResourceType, &Record)> = Vec::new();
                for (owner_type, owner) in &owners {
                    let Some(owner_id) = record_id(owner_type, owner) else {
                        continue;
                    };
                    for record in set.by_owner.get(&owner_id).into_iter().flatten() {
                        next.push((set.resource.as_ref(), record));
                    }
                }
                for (resource, record) in &next {
                    let object = self.resource_object(resource, record, &path, page, layer)?;
                    let ident = object.identifier();
                    if primary_ids.contains(&ident) {
                        continue;
                    }
                    match positions.get(&ident) {
                        Some(&at) => merge_linkage(&mut included[at], object),
                        None => {
                            positions.insert(ident, included.len());
                            included.push(object);
                        }
                    }
                }
                owners = next;
            }
        }
        Ok(included)
    }

    fn top_links(
        &self,
        request: &RequestLinks,
        layer: &QueryLayer,
        returned: usize,
        total: Option<u64>,
    ) -> TopLevelLinks {
        let mut links = TopLevelLinks {
            self_link: request.url(&self.base_url, None),
            ..TopLevelLinks::default()
        };
        let Some(size) = layer.pagination.size.filter(|&n| n > 0) else {
            return links;
        };
        let number = layer.pagination.number;
        let page_url = |n: u32| Some(request.url(&self.base_url, Some((n, size))));
        links.first = page_url(1);
        if number > 1 {
            links.prev = page_url(number - 1);
        }
        let has_next = match total {
            Some(total) => u64::from(number) * u64::from(size) < total,
            None => returned as u64 >= u64::from(size),
        };
        if has_next {
            links.next = page_url(number + 1);
        }
        if let Some(total) = total {
            let last = total.div_ceil(u64::from(size)).max(1);
            links.last = page_url(u32::try_from(last).unwrap_or(u32::MAX));
        }
        links
    }
}

/// Fill relationships that have no `data` yet from another rendering of the same resource.
fn merge_linkage(existing: &mut ResourceObject, other: ResourceObject) {
    for (name, relationship) in other.relationships {
        let Some(data) = relationship.data else {
            continue;
        };
        if let Some(slot) = existing.relationships.get_mut(&name) {
            slot.data.get_or_insert(data);
        }
    }
}
