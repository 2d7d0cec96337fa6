//! Resource type metadata: attributes, relationships, identity and server defaults.

use serde::{Deserialize, Serialize};

/// Storage type of a resource identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    Integer,
    Uuid,
    String,
}

impl IdType {
    pub fn attr_type(&self) -> AttrType {
        match self {
            IdType::Integer => AttrType::Integer,
            IdType::Uuid => AttrType::Uuid,
            IdType::String => AttrType::String,
        }
    }
}

/// Value type of an attribute; drives literal conversion for filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    DateTime,
    Date,
    Json,
}

impl AttrType {
    pub fn is_text(&self) -> bool {
        matches!(self, AttrType::String)
    }
}

/// What clients may do with an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttrCapabilities {
    pub filter: bool,
    pub sort: bool,
    pub create: bool,
    pub update: bool,
}

impl Default for AttrCapabilities {
    fn default() -> Self {
        AttrCapabilities {
            filter: true,
            sort: true,
            create: true,
            update: true,
        }
    }
}

impl AttrCapabilities {
    pub fn none() -> Self {
        AttrCapabilities {
            filter: false,
            sort: false,
            create: false,
            update: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub public_name: String,
    pub column: String,
    pub attr_type: AttrType,
    pub capabilities: AttrCapabilities,
}

impl Attribute {
    /// Attribute whose public name is the camelCase form of the column.
    pub fn new(column: &str, attr_type: AttrType) -> Self {
        Attribute {
            public_name: crate::case::to_camel_case(column),
            column: column.to_string(),
            attr_type,
            capabilities: AttrCapabilities::default(),
        }
    }

    pub fn named(mut self, public_name: &str) -> Self {
        self.public_name = public_name.to_string();
        self
    }

    pub fn capabilities(mut self, capabilities: AttrCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Storage-only attribute for join keys; not addressable by clients.
    pub(crate) fn key_column(column: &str, attr_type: AttrType) -> Self {
        Attribute {
            public_name: column.to_string(),
            column: column.to_string(),
            attr_type,
            capabilities: AttrCapabilities::none(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    ToOne,
    ToMany,
}

/// A navigation from one resource type to another.
///
/// Join: `owner.our_key = target.their_key`. For to-one, `our_key` is the
/// owner's foreign key and `their_key` the target's identity; for to-many,
/// `our_key` is the owner's identity and `their_key` the target's foreign key.
/// An identity key left empty by `to_one` / `to_many` is filled with the
/// matching `id_column` when the graph is built.
#[derive(Clone, Debug, PartialEq)]
pub struct Relationship {
    pub public_name: String,
    pub kind: RelationshipKind,
    /// Public name of the target resource type.
    pub target: String,
    pub includable: bool,
    pub our_key: String,
    pub their_key: String,
}

impl Relationship {
    /// To-one through a foreign key column on the owner, joined to the target's identity.
    pub fn to_one(public_name: &str, target: &str, foreign_key: &str) -> Self {
        Relationship {
            public_name: public_name.to_string(),
            kind: RelationshipKind::ToOne,
            target: target.to_string(),
            includable: true,
            our_key: foreign_key.to_string(),
            their_key: String::new(),
        }
    }

    /// To-many through a foreign key column on the target, joined to the owner's identity.
    pub fn to_many(public_name: &str, target: &str, foreign_key: &str) -> Self {
        Relationship {
            public_name: public_name.to_string(),
            kind: RelationshipKind::ToMany,
            target: target.to_string(),
            includable: true,
            our_key: String::new(),
            their_key: foreign_key.to_string(),
        }
    }

    pub fn keys(mut self, our_key: &str, their_key: &str) -> Self {
        self.our_key = our_key.to_string();
        self.their_key = their_key.to_string();
        self
    }

    pub fn includable(mut self, includable: bool) -> Self {
        self.includable = includable;
        self
    }

    pub fn is_to_many(&self) -> bool {
        self.kind == RelationshipKind::ToMany
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Server-side defaults declared per resource type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceDefaults {
    /// Sort applied when the client sends none, in `sort` parameter syntax (e.g. "-priority,title").
    pub sort: Option<String>,
    /// Filter always AND-ed with the client filter, in `filter` expression syntax.
    pub filter: Option<String>,
    pub page_size: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResourceType {
    /// Kebab-case, normalized public name (e.g. "todo-items").
    pub public_name: String,
    /// Backing model identity (e.g. "TodoItem").
    pub model: String,
    pub schema: String,
    pub table: String,
    pub id_column: String,
    pub id_type: IdType,
    pub attributes: Vec<Attribute>,
    pub relationships: Vec<Relationship>,
    pub defaults: ResourceDefaults,
}

impl ResourceType {
    /// Attribute by public name, including the implicit "id".
    pub fn attribute(&self, name: &str) -> Option<Attribute> {
        if name == "id" {
            return Some(self.id_attribute());
        }
        self.attributes.iter().find(|a| a.public_name == name).cloned()
    }

    /// The identity as a filterable, sortable attribute.
    pub fn id_attribute(&self) -> Attribute {
        Attribute {
            public_name: "id".to_string(),
            column: self.id_column.clone(),
            attr_type: self.id_type.attr_type(),
            capabilities: AttrCapabilities {
                filter: true,
                sort: true,
                create: false,
                update: false,
            },
        }
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.public_name == name)
    }

    /// Whether `column` is the identity, an attribute column or a to-one foreign key of this type.
    pub fn declares_column(&self, column: &str) -> bool {
        column == self.id_column
            || self.attributes.iter().any(|a| a.column == column)
            || self.relationships.iter().any(|r| !r.is_to_many() && r.our_key == column)
    }

    /// Columns a store must return for this type: identity, attributes and relationship keys.
    pub fn stored_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = vec![self.id_column.clone()];
        let attr_cols = self.attributes.iter().map(|a| a.column.clone());
        let key_cols = self.relationships.iter().map(|r| r.our_key.clone());
        for c in attr_cols.chain(key_cols) {
            if !cols.contains(&c) {
                cols.push(c);
            }
        }
        cols
    }
}
