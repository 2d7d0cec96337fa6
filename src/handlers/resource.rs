//! Read handlers for any resource in the graph.

use crate::error::AppError;
use crate::response::document_ok;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use tokio_util::sync::CancellationToken;

/// `GET /:resource`
pub async fn get_collection(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    // dropped with the request future when the client disconnects
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let document = state
        .pipeline
        .get_collection(&resource, &params, state.source.as_ref(), &cancel)
        .await?;
    Ok(document_ok(document))
}

/// `GET /:resource/:id`
pub async fn get_single(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let document = state
        .pipeline
        .get_single(&resource, &id, &params, state.source.as_ref(), &cancel)
        .await?;
    Ok(document_ok(document))
}
