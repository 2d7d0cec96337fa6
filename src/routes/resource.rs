//! Resource routes. The resource segment is resolved against the graph per request.

use crate::handlers::resource::{get_collection, get_single};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/:resource", get(get_collection))
        .route("/:resource/:id", get(get_single))
        .with_state(state)
}
