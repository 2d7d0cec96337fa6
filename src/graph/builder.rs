//! Startup registration of resource types into an immutable graph.

use crate::case::{to_kebab_case, to_snake_case};
use crate::config::PluralizationStrategy;
use crate::error::ConfigError;
use crate::graph::resource::*;
use crate::graph::ResourceGraph;
use crate::query::{QueryLayerBuilder, QueryStringParser};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Fluent description of one resource type. Names are resolved when the graph is built.
#[derive(Clone, Debug)]
pub struct ResourceTypeBuilder {
    model: String,
    public_name: Option<String>,
    schema: String,
    table: Option<String>,
    id_column: String,
    id_type: IdType,
    attributes: Vec<Attribute>,
    relationships: Vec<Relationship>,
    defaults: ResourceDefaults,
}

impl ResourceTypeBuilder {
    pub fn new(model: &str) -> Self {
        ResourceTypeBuilder {
            model: model.to_string(),
            public_name: None,
            schema: "public".to_string(),
            table: None,
            id_column: "id".to_string(),
            id_type: IdType::Integer,
            attributes: Vec::new(),
            relationships: Vec::new(),
            defaults: ResourceDefaults::default(),
        }
    }

    /// Explicit public name; skips the pluralization strategy.
    pub fn public_name(mut self, name: &str) -> Self {
        self.public_name = Some(name.to_string());
        self
    }

    pub fn table(mut self, schema: &str, table: &str) -> Self {
        self.schema = schema.to_string();
        self.table = Some(table.to_string());
        self
    }

    /// Schema only; the table name stays derived from the public name.
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    pub fn id(mut self, column: &str, id_type: IdType) -> Self {
        self.id_column = column.to_string();
        self.id_type = id_type;
        self
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// `target` may be the target's model name or public name.
    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn default_sort(mut self, sort: &str) -> Self {
        self.defaults.sort = Some(sort.to_string());
        self
    }

    pub fn default_filter(mut self, filter: &str) -> Self {
        self.defaults.filter = Some(filter.to_string());
        self
    }

    pub fn default_page_size(mut self, size: u32) -> Self {
        self.defaults.page_size = Some(size);
        self
    }
}

pub struct ResourceGraphBuilder {
    strategy: PluralizationStrategy,
    pending: Vec<ResourceTypeBuilder>,
}

impl ResourceGraphBuilder {
    pub fn new(strategy: PluralizationStrategy) -> Self {
        ResourceGraphBuilder {
            strategy,
            pending: Vec::new(),
        }
    }

    pub fn register(mut self, resource: ResourceTypeBuilder) -> Self {
        self.pending.push(resource);
        self
    }

    /// Resolve names, check integrity and freeze the graph.
    pub fn build(self) -> Result<ResourceGraph, ConfigError> {
        let member_name = Regex::new(r"^[a-zA-Z0-9](?:[a-zA-Z0-9_-]*[a-zA-Z0-9])?$")
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        // model or public name -> normalized public name, for relationship targets
        let mut target_names: HashMap<String, String> = HashMap::new();
        let mut id_columns: HashMap<String, String> = HashMap::new();
        let mut seen_models = HashSet::new();
        let mut seen_names = HashSet::new();
        let mut named = Vec::with_capacity(self.pending.len());
        for rb in self.pending {
            let public_name = match &rb.public_name {
                Some(n) => to_kebab_case(n),
                None => self.strategy.public_name(&rb.model),
            };
            if !member_name.is_match(&public_name) {
                return Err(ConfigError::InvalidMemberName(public_name));
            }
            if !seen_models.insert(rb.model.clone()) {
                return Err(ConfigError::Duplicate {
                    kind: "model",
                    name: rb.model.clone(),
                });
            }
            if !seen_names.insert(public_name.clone()) {
                return Err(ConfigError::Duplicate {
                    kind: "resource type",
                    name: public_name,
                });
            }
            target_names.insert(rb.model.clone(), public_name.clone());
            target_names.insert(public_name.clone(), public_name.clone());
            id_columns.insert(public_name.clone(), rb.id_column.clone());
            named.push((public_name, rb));
        }

        let mut resources = Vec::with_capacity(named.len());
        for (public_name, rb) in named {
            let mut members = HashSet::new();
            members.insert("id".to_string());
            for attr in &rb.attributes {
                check_member(&member_name, &public_name, &attr.public_name, &mut members)?;
            }
            let mut relationships = Vec::with_capacity(rb.relationships.len());
            for rel in rb.relationships {
                check_member(&member_name, &public_name, &rel.public_name, &mut members)?;
                let target = target_names
                    .get(&rel.target)
                    .or_else(|| target_names.get(&to_kebab_case(&rel.target)))
                    .ok_or_else(|| ConfigError::MissingReference {
                        kind: "relationship target",
                        id: format!("{}.{} -> {}", public_name, rel.public_name, rel.target),
                    })?;
                let mut rel = Relationship {
                    target: target.clone(),
                    ..rel
                };
                if rel.our_key.is_empty() {
                    rel.our_key = rb.id_column.clone();
                }
                if rel.their_key.is_empty() {
                    rel.their_key = id_columns.get(target).cloned().unwrap_or_default();
                }
                relationships.push(rel);
            }
            let table = rb.table.unwrap_or_else(|| to_snake_case(&public_name));
            resources.push(ResourceType {
                public_name,
                model: rb.model,
                schema: rb.schema,
                table,
                id_column: rb.id_column,
                id_type: rb.id_type,
                attributes: rb.attributes,
                relationships,
                defaults: rb.defaults,
            });
        }

        for resource in &resources {
            for rel in &resource.relationships {
                validate_keys(&resources, resource, rel)?;
            }
        }

        let graph = ResourceGraph::from_resources(resources.into_iter().map(Arc::new).collect());
        for resource in graph.iter() {
            validate_defaults(&graph, resource)?;
        }
        tracing::info!(resources = graph.len(), "resource graph built");
        Ok(graph)
    }
}

fn check_member(
    member_name: &Regex,
    resource: &str,
    name: &str,
    members: &mut HashSet<String>,
) -> Result<(), ConfigError> {
    if !member_name.is_match(name) {
        return Err(ConfigError::InvalidMemberName(format!("{}.{}", resource, name)));
    }
    if !members.insert(name.to_string()) {
        return Err(ConfigError::Duplicate {
            kind: "field",
            name: format!("{}.{}", resource, name),
        });
    }
    Ok(())
}

/// The referenced side of a join must be a column the resource declares.
/// To-one joins reference the target unless they start from the owner's identity;
/// to-many joins reference the owner.
fn validate_keys(resources: &[ResourceType], owner: &ResourceType, rel: &Relationship) -> Result<(), ConfigError> {
    let target = resources
        .iter()
        .find(|r| r.public_name == rel.target)
        .ok_or_else(|| ConfigError::MissingReference {
            kind: "relationship target",
            id: format!("{}.{} -> {}", owner.public_name, rel.public_name, rel.target),
        })?;
    let (resource, column) = if rel.is_to_many() || rel.our_key == owner.id_column {
        (owner, &rel.our_key)
    } else {
        (target, &rel.their_key)
    };
    if rel.our_key.is_empty() || rel.their_key.is_empty() || !resource.declares_column(column) {
        return Err(ConfigError::MissingReference {
            kind: "relationship key",
            id: format!("{}.{} -> {}.{}", owner.public_name, rel.public_name, resource.public_name, column),
        });
    }
    Ok(())
}

/// Server defaults must resolve against the finished graph like client input would.
fn validate_defaults(graph: &ResourceGraph, resource: &Arc<ResourceType>) -> Result<(), ConfigError> {
    let invalid = |e: crate::error::QueryError| {
        ConfigError::Validation(format!("defaults of '{}': {}", resource.public_name, e))
    };
    if let Some(sort) = &resource.defaults.sort {
        let raw = QueryStringParser::parse_sort("sort", sort).map_err(invalid)?;
        QueryLayerBuilder::resolve_sort(graph, resource, &raw).map_err(invalid)?;
    }
    if let Some(filter) = &resource.defaults.filter {
        let raw = QueryStringParser::parse_filter_expression("filter", filter).map_err(invalid)?;
        QueryLayerBuilder::resolve_filter(graph, resource, &raw).map_err(invalid)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn article() -> ResourceTypeBuilder {
        ResourceTypeBuilder::new("Article")
            .attribute(Attribute::new("title", AttrType::String))
            .relationship(Relationship::to_one("author", "Person", "author_id"))
    }

    #[test]
    fn test_build_resolves_targets_by_model() {
        let graph = ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(article())
            .register(ResourceTypeBuilder::new("Person").attribute(Attribute::new("name", AttrType::String)))
            .build()
            .unwrap();
        let articles = graph.resolve("articles").unwrap();
        assert_eq!(articles.table, "articles");
        assert_eq!(articles.relationship("author").unwrap().target, "persons");
    }

    #[test]
    fn test_missing_target_fails() {
        let err = ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(article())
            .build()
            .unwrap_err();
        assert_matches!(err, ConfigError::MissingReference { kind: "relationship target", .. });
    }

    #[test]
    fn test_duplicate_public_name_fails() {
        let err = ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(ResourceTypeBuilder::new("Tag"))
            .register(ResourceTypeBuilder::new("Label").public_name("tags"))
            .build()
            .unwrap_err();
        assert_matches!(err, ConfigError::Duplicate { kind: "resource type", .. });
    }

    #[test]
    fn test_duplicate_field_fails() {
        let err = ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(
                ResourceTypeBuilder::new("Tag")
                    .attribute(Attribute::new("name", AttrType::String))
                    .attribute(Attribute::new("label", AttrType::String).named("name")),
            )
            .build()
            .unwrap_err();
        assert_matches!(err, ConfigError::Duplicate { kind: "field", .. });
    }

    #[test]
    fn test_invalid_member_name_fails() {
        let err = ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(ResourceTypeBuilder::new("Tag").attribute(Attribute::new("name", AttrType::String).named("bad name")))
            .build()
            .unwrap_err();
        assert_matches!(err, ConfigError::InvalidMemberName(_));
    }

    #[test]
    fn test_identity_keys_follow_custom_id_columns() {
        let graph = ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(article().relationship(Relationship::to_many("comments", "Comment", "article_id")))
            .register(ResourceTypeBuilder::new("Person").id("person_id", IdType::Integer))
            .register(ResourceTypeBuilder::new("Comment").id("comment_id", IdType::Integer))
            .build()
            .unwrap();
        let articles = graph.resolve("articles").unwrap();
        let author = articles.relationship("author").unwrap();
        assert_eq!((author.our_key.as_str(), author.their_key.as_str()), ("author_id", "person_id"));
        let comments = articles.relationship("comments").unwrap();
        assert_eq!((comments.our_key.as_str(), comments.their_key.as_str()), ("id", "article_id"));
    }

    #[test]
    fn test_undeclared_key_column_fails() {
        let err = ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(
                ResourceTypeBuilder::new("Article")
                    .relationship(Relationship::to_one("author", "Person", "author_id").keys("author_id", "id")),
            )
            .register(ResourceTypeBuilder::new("Person").id("person_id", IdType::Integer))
            .build()
            .unwrap_err();
        assert_matches!(err, ConfigError::MissingReference { kind: "relationship key", id } if id.contains("persons.id"));

        let err = ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(
                ResourceTypeBuilder::new("Article")
                    .relationship(Relationship::to_many("comments", "Comment", "article_id").keys("slug", "article_slug")),
            )
            .register(ResourceTypeBuilder::new("Comment"))
            .build()
            .unwrap_err();
        assert_matches!(err, ConfigError::MissingReference { kind: "relationship key", .. });
    }

    #[test]
    fn test_key_columns_may_be_attributes() {
        let graph = ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(
                ResourceTypeBuilder::new("Article")
                    .attribute(Attribute::new("slug", AttrType::String))
                    .relationship(Relationship::to_many("comments", "Comment", "article_id").keys("slug", "article_slug")),
            )
            .register(ResourceTypeBuilder::new("Comment"))
            .build();
        assert!(graph.is_ok());
    }

    #[test]
    fn test_invalid_default_sort_fails() {
        let err = ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(ResourceTypeBuilder::new("Tag").default_sort("-priority"))
            .build()
            .unwrap_err();
        assert_matches!(err, ConfigError::Validation(msg) if msg.contains("priority"));
    }
}
