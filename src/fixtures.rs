//! Blog graph shared by unit tests: articles, people, comments.

use crate::config::PluralizationStrategy;
use crate::graph::*;
use crate::repository::Record;
use serde_json::json;
use std::sync::Arc;

pub(crate) fn blog_graph() -> Arc<ResourceGraph> {
    Arc::new(
        ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(
                ResourceTypeBuilder::new("Article")
                    .attribute(Attribute::new("title", AttrType::String))
                    .attribute(Attribute::new("body", AttrType::String))
                    .attribute(Attribute::new("word_count", AttrType::Integer))
                    .attribute(Attribute::new("published_at", AttrType::DateTime))
                    .attribute(Attribute::new("secret", AttrType::String).capabilities(AttrCapabilities::none()))
                    .relationship(Relationship::to_one("author", "Person", "author_id"))
                    .relationship(Relationship::to_one("editor", "Person", "editor_id").includable(false))
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

pub(crate) fn record(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("record fixture must be an object, got {}", other),
    }
}

pub(crate) fn blog_rows() -> Vec<(&'static str, Vec<Record>)> {
    vec![
        (
            "articles",
            vec![
                record(json!({"id": 1, "title": "Rust ownership", "body": "Borrowing rules", "word_count": 1200,
                    "published_at": "2024-01-10T08:00:00+00:00", "secret": "s1", "author_id": 10, "editor_id": 11})),
                record(json!({"id": 2, "title": "Async in practice", "body": "Futures", "word_count": 800,
                    "published_at": "2024-02-01T08:00:00+00:00", "secret": "s2", "author_id": 11, "editor_id": null})),
                record(json!({"id": 3, "title": "Draft notes", "body": "Unpublished", "word_count": 50,
                    "published_at": null, "secret": "s3", "author_id": 10, "editor_id": null})),
            ],
        ),
        (
            "people",
            vec![
                record(json!({"id": 10, "name": "Ann"})),
                record(json!({"id": 11, "name": "Bob"})),
            ],
        ),
        (
            "comments",
            vec![
                record(json!({"id": 100, "body": "Great post", "author_id": 11, "article_id": 1})),
                record(json!({"id": 101, "body": "Thanks", "author_id": 10, "article_id": 1})),
                record(json!({"id": 102, "body": "Helpful", "author_id": 11, "article_id": 2})),
            ],
        ),
    ]
}
