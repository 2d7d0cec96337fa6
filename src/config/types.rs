//! Raw config types matching `resources.json`.

use crate::graph::{AttrCapabilities, AttrType, IdType, RelationshipKind};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    pub resources: Vec<ResourceConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Backing model identity, e.g. "TodoItem".
    pub model: String,
    /// Overrides the pluralized kebab-case name.
    #[serde(default)]
    pub public_name: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub id: IdConfig,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdConfig {
    #[serde(default = "default_id_column")]
    pub column: String,
    #[serde(default = "default_id_type", rename = "type")]
    pub id_type: IdType,
}

impl Default for IdConfig {
    fn default() -> Self {
        IdConfig {
            column: default_id_column(),
            id_type: default_id_type(),
        }
    }
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_id_type() -> IdType {
    IdType::Integer
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub column: String,
    #[serde(rename = "type")]
    pub attr_type: AttrType,
    /// Public name; defaults to the camelCase column name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capabilities: AttrCapabilities,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub name: String,
    pub kind: RelationshipKind,
    /// Target model or public name.
    pub target: String,
    /// Owner column for to_one, target column for to_many.
    #[serde(default)]
    pub foreign_key: Option<String>,
    /// Explicit join keys; both must be given together and override `foreign_key`.
    #[serde(default)]
    pub our_key: Option<String>,
    #[serde(default)]
    pub their_key: Option<String>,
    #[serde(default = "default_true")]
    pub includable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
}
