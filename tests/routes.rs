mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use common::*;
use jsonapi_sdk::{app, ApiOptions, AppState, JSONAPI_MEDIA_TYPE};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

fn router() -> Router {
    app(AppState::new(pipeline(ApiOptions::default()), blog_source()))
}

async fn get(uri: &str) -> (StatusCode, Option<String>, Value) {
    let response = router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, content_type, body)
}

#[tokio::test]
async fn test_collection_route() {
    let (status, content_type, body) = get("/articles?sort=-wordCount&include=author").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(JSONAPI_MEDIA_TYPE));
    assert_eq!(ids(&body["data"]), vec!["1", "2", "3"]);
    let mut people = ids(&body["included"]);
    people.sort();
    assert_eq!(people, vec!["10", "11"]);
}

#[tokio::test]
async fn test_bracketed_parameters_are_decoded() {
    let (status, _, body) = get("/articles?filter%5Bauthor.name%5D=Ann&fields%5Barticles%5D=title").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body["data"]), vec!["1", "3"]);
    assert_eq!(body["data"][0]["attributes"], json!({"title": "Rust ownership"}));
}

#[tokio::test]
async fn test_single_route() {
    let (status, content_type, body) = get("/people/11").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(JSONAPI_MEDIA_TYPE));
    assert_eq!(body["data"]["attributes"]["name"], json!("Bob"));
    assert_eq!(body["data"]["relationships"]["articles"]["data"], json!([{"type": "articles", "id": "2"}]));
}

#[tokio::test]
async fn test_invalid_filter_is_bad_request() {
    let (status, content_type, body) = get("/articles?filter%5Bbody%5D=foo").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(content_type.as_deref(), Some(JSONAPI_MEDIA_TYPE));
    let error = &body["errors"][0];
    assert_eq!(error["status"], json!("400"));
    assert_eq!(error["code"], json!("invalid_filter_target"));
    assert_eq!(error["source"]["parameter"], json!("filter[body]"));
}

#[tokio::test]
async fn test_not_found() {
    let (status, _, body) = get("/widgets").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0]["code"], json!("unknown_resource"));

    let (status, _, body) = get("/articles/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0]["code"], json!("not_found"));
}

#[tokio::test]
async fn test_malformed_id_is_bad_request() {
    let (status, _, body) = get("/articles/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["source"]["parameter"], json!("id"));
}

#[tokio::test]
async fn test_common_routes() {
    let (status, _, body) = get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (status, _, body) = get("/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], json!("ok"));
    assert_eq!(body["resources"], json!(3));

    let (status, _, body) = get("/version").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], json!("jsonapi-sdk"));
}
