//! JSON:API response helpers.

use crate::document::Document;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

/// 200 with the JSON:API media type.
pub fn document_ok(document: Document) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, JSONAPI_MEDIA_TYPE)],
        Json(document),
    )
        .into_response()
}
