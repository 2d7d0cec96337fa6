//! Load resource config from JSON files and resolve it into a resource graph.

use crate::config::types::*;
use crate::config::{validate, ApiOptions, FullConfig};
use crate::error::ConfigError;
use crate::graph::{Attribute, Relationship, RelationshipKind, ResourceGraph, ResourceGraphBuilder, ResourceTypeBuilder};
use std::path::Path;

pub const RESOURCES_FILE: &str = "resources.json";
pub const OPTIONS_FILE: &str = "options.json";

/// Build the resource graph from full config (validates first).
pub fn resolve(config: &FullConfig, options: &ApiOptions) -> Result<ResourceGraph, ConfigError> {
    validate(config)?;
    config
        .resources
        .iter()
        .fold(ResourceGraphBuilder::new(options.pluralization), |graph, rc| {
            graph.register(resource_builder(rc))
        })
        .build()
}

fn resource_builder(rc: &ResourceConfig) -> ResourceTypeBuilder {
    let mut rb = ResourceTypeBuilder::new(&rc.model).id(&rc.id.column, rc.id.id_type);
    if let Some(name) = &rc.public_name {
        rb = rb.public_name(name);
    }
    let schema = rc.schema.as_deref().unwrap_or("public");
    rb = match &rc.table {
        Some(table) => rb.table(schema, table),
        None => rb.schema(schema),
    };
    for a in &rc.attributes {
        let mut attr = Attribute::new(&a.column, a.attr_type).capabilities(a.capabilities);
        if let Some(name) = &a.name {
            attr = attr.named(name);
        }
        rb = rb.attribute(attr);
    }
    for rel in &rc.relationships {
        rb = rb.relationship(relationship(rel));
    }
    if let Some(sort) = &rc.defaults.sort {
        rb = rb.default_sort(sort);
    }
    if let Some(filter) = &rc.defaults.filter {
        rb = rb.default_filter(filter);
    }
    if let Some(size) = rc.defaults.page_size {
        rb = rb.default_page_size(size);
    }
    rb
}

/// Keys were checked by `validate`: either both explicit keys or a foreign key.
fn relationship(rel: &RelationshipConfig) -> Relationship {
    let foreign_key = rel.foreign_key.as_deref().unwrap_or_default();
    let base = match rel.kind {
        RelationshipKind::ToOne => Relationship::to_one(&rel.name, &rel.target, foreign_key),
        RelationshipKind::ToMany => Relationship::to_many(&rel.name, &rel.target, foreign_key),
    };
    let base = match (&rel.our_key, &rel.their_key) {
        (Some(ours), Some(theirs)) => base.keys(ours, theirs),
        _ => base,
    };
    base.includable(rel.includable)
}

/// Read `resources.json` from a config directory.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    load_from_file(dir.as_ref().join(RESOURCES_FILE)).await
}

pub async fn load_from_file(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    read_json(path.as_ref()).await
}

/// Read `options.json` from a config directory; a missing file yields defaults.
pub async fn load_options_from_dir(dir: impl AsRef<Path>) -> Result<ApiOptions, ConfigError> {
    let path = dir.as_ref().join(OPTIONS_FILE);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(ApiOptions::default());
    }
    read_json(&path).await
}

async fn read_json<T>(path: &Path) -> Result<T, ConfigError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    tracing::debug!(path = %path.display(), "loading config");
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AttrType, IdType};
    use assert_matches::assert_matches;

    const BLOG: &str = r#"{
        "resources": [
            {
                "model": "Article",
                "table": "blog_articles",
                "attributes": [
                    { "column": "title", "type": "string" },
                    { "column": "word_count", "type": "integer" },
                    { "column": "body", "type": "string", "capabilities": { "filter": false } }
                ],
                "relationships": [
                    { "name": "author", "kind": "to_one", "target": "Person", "foreign_key": "author_id" },
                    { "name": "comments", "kind": "to_many", "target": "comments", "foreign_key": "article_id" }
                ],
                "defaults": { "sort": "-wordCount", "page_size": 5 }
            },
            {
                "model": "Person",
                "public_name": "people",
                "schema": "auth",
                "id": { "column": "person_id", "type": "uuid" },
                "attributes": [{ "column": "name", "type": "string" }]
            },
            {
                "model": "Comment",
                "attributes": [{ "column": "body", "type": "string" }],
                "relationships": [
                    { "name": "writer", "kind": "to_one", "target": "people", "our_key": "writer_id", "their_key": "person_id", "includable": false }
                ]
            }
        ]
    }"#;

    fn blog() -> FullConfig {
        serde_json::from_str(BLOG).unwrap()
    }

    #[test]
    fn test_resolve_blog_config() {
        let graph = resolve(&blog(), &ApiOptions::default()).unwrap();
        let articles = graph.resolve("articles").unwrap();
        assert_eq!(articles.table, "blog_articles");
        assert_eq!(articles.schema, "public");
        assert_eq!(articles.attribute("wordCount").unwrap().attr_type, AttrType::Integer);
        assert!(!articles.attribute("body").unwrap().capabilities.filter);
        assert!(articles.attribute("body").unwrap().capabilities.sort);
        assert_eq!(articles.defaults.page_size, Some(5));

        let author = articles.relationship("author").unwrap();
        assert_eq!(author.target, "people");
        assert_eq!((author.our_key.as_str(), author.their_key.as_str()), ("author_id", "person_id"));
        let comments = articles.relationship("comments").unwrap();
        assert_eq!((comments.our_key.as_str(), comments.their_key.as_str()), ("id", "article_id"));

        let people = graph.resolve("people").unwrap();
        assert_eq!(people.schema, "auth");
        assert_eq!(people.table, "people");
        assert_eq!(people.id_type, IdType::Uuid);
        assert_eq!(people.id_column, "person_id");
    }

    #[test]
    fn test_explicit_keys_override_foreign_key() {
        let graph = resolve(&blog(), &ApiOptions::default()).unwrap();
        let writer = graph.resolve("comments").unwrap().relationship("writer").cloned().unwrap();
        assert_eq!(writer.our_key, "writer_id");
        assert_eq!(writer.their_key, "person_id");
        assert!(!writer.includable);
    }

    #[test]
    fn test_relationship_without_keys_fails() {
        let mut config = blog();
        config.resources[0].relationships[0].foreign_key = None;
        assert_matches!(
            resolve(&config, &ApiOptions::default()),
            Err(ConfigError::MissingReference { kind: "foreign_key", id }) if id == "Article.author"
        );
    }

    #[test]
    fn test_half_explicit_keys_fail() {
        let mut config = blog();
        config.resources[2].relationships[0].their_key = None;
        assert_matches!(resolve(&config, &ApiOptions::default()), Err(ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_default_is_rejected_at_startup() {
        let mut config = blog();
        config.resources[0].defaults.sort = Some("-rating".into());
        assert_matches!(resolve(&config, &ApiOptions::default()), Err(ConfigError::Validation(msg)) if msg.contains("rating"));
    }

    #[test]
    fn test_empty_config_fails() {
        assert_matches!(
            resolve(&FullConfig::default(), &ApiOptions::default()),
            Err(ConfigError::Validation(_))
        );
    }

    #[tokio::test]
    async fn test_load_from_dir() {
        let dir = std::env::temp_dir().join(format!("jsonapi-sdk-config-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join(RESOURCES_FILE), BLOG).await.unwrap();

        let config = load_from_dir(&dir).await.unwrap();
        assert_eq!(config.resources.len(), 3);
        let options = load_options_from_dir(&dir).await.unwrap();
        assert_eq!(options, ApiOptions::default());

        tokio::fs::write(dir.join(OPTIONS_FILE), r#"{ "max_page_size": 50, "pluralization": "none" }"#)
            .await
            .unwrap();
        let options = load_options_from_dir(&dir).await.unwrap();
        assert_eq!(options.max_page_size, Some(50));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let err = load_from_file("/nonexistent/resources.json").await.unwrap_err();
        assert_matches!(err, ConfigError::Load(msg) if msg.contains("resources.json"));
    }
}
