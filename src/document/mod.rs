//! JSON:API top-level document and resource object types.

mod serializer;

pub use serializer::{DocumentSerializer, RequestLinks};

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const JSONAPI_VERSION: &str = "1.1";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Document {
    pub data: PrimaryData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<ResourceObject>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
    pub links: TopLevelLinks,
    pub jsonapi: JsonApiObject,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PrimaryData {
    Many(Vec<ResourceObject>),
    One(Option<ResourceObject>),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipObject>,
    pub links: ResourceLinks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl ResourceObject {
    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier {
            resource_type: self.resource_type.clone(),
            id: self.id.clone(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RelationshipObject {
    pub links: RelationshipLinks,
    /// Omitted when linkage was not loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Linkage>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Linkage {
    ToOne(Option<ResourceIdentifier>),
    ToMany(Vec<ResourceIdentifier>),
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ResourceLinks {
    #[serde(rename = "self")]
    pub self_link: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RelationshipLinks {
    #[serde(rename = "self")]
    pub self_link: String,
    pub related: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct TopLevelLinks {
    #[serde(rename = "self")]
    pub self_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct JsonApiObject {
    pub version: &'static str,
}

impl Default for JsonApiObject {
    fn default() -> Self {
        JsonApiObject {
            version: JSONAPI_VERSION,
        }
    }
}
