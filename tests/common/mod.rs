//! Shared blog fixtures for integration tests.
#![allow(dead_code)]

use jsonapi_sdk::graph::*;
use jsonapi_sdk::{ApiOptions, InMemoryDataSource, JsonApiPipeline, PluralizationStrategy, Record};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn blog_graph() -> Arc<ResourceGraph> {
    let not_filterable = AttrCapabilities {
        filter: false,
        ..AttrCapabilities::default()
    };
    Arc::new(
        ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(
                ResourceTypeBuilder::new("Article")
                    .attribute(Attribute::new("title", AttrType::String))
                    .attribute(Attribute::new("body", AttrType::String).capabilities(not_filterable))
                    .attribute(Attribute::new("word_count", AttrType::Integer))
                    .attribute(Attribute::new("published_at", AttrType::DateTime))
                    .relationship(Relationship::to_one("author", "Person", "author_id"))
                    .relationship(Relationship::to_many("comments", "Comment", "article_id")),
            )
            .register(
                ResourceTypeBuilder::new("Person")
                    .public_name("people")
                    .attribute(Attribute::new("name", AttrType::String))
                    .relationship(Relationship::to_many("articles", "Article", "author_id")),
            )
            .register(
                ResourceTypeBuilder::new("Comment")
                    .attribute(Attribute::new("body", AttrType::String))
                    .relationship(Relationship::to_one("author", "Person", "author_id"))
                    .relationship(Relationship::to_one("article", "Article", "article_id")),
            )
            .build()
            .unwrap(),
    )
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("record fixture must be an object, got {}", other),
    }
}

pub fn blog_source() -> InMemoryDataSource {
    InMemoryDataSource::with_tables([
        (
            "articles",
            vec![
                record(json!({"id": 1, "title": "Rust ownership", "body": "Borrowing rules", "word_count": 1200,
                    "published_at": "2024-01-10T08:00:00+00:00", "author_id": 10})),
                record(json!({"id": 2, "title": "Async in practice", "body": "Futures", "word_count": 800,
                    "published_at": "2024-02-01T08:00:00+00:00", "author_id": 11})),
                record(json!({"id": 3, "title": "Draft notes", "body": "Unpublished", "word_count": 50,
                    "published_at": null, "author_id": 10})),
            ],
        ),
        (
            "people",
            vec![record(json!({"id": 10, "name": "Ann"})), record(json!({"id": 11, "name": "Bob"}))],
        ),
        (
            "comments",
            vec![
                record(json!({"id": 100, "body": "Great post", "author_id": 11, "article_id": 1})),
                record(json!({"id": 101, "body": "Thanks", "author_id": 10, "article_id": 1})),
                record(json!({"id": 102, "body": "Helpful", "author_id": 11, "article_id": 2})),
            ],
        ),
    ])
}

pub fn pipeline(options: ApiOptions) -> JsonApiPipeline {
    JsonApiPipeline::new(blog_graph(), options)
}

pub fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// `(type, id)` of every object in a serialized `data` array or `included`.
pub fn identities(objects: &Value) -> Vec<(String, String)> {
    objects
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|o| (o["type"].as_str().unwrap_or_default().to_string(), o["id"].as_str().unwrap_or_default().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

pub fn ids(objects: &Value) -> Vec<String> {
    identities(objects).into_iter().map(|(_, id)| id).collect()
}
