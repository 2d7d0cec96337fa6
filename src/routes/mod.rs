//! Router assembly.

pub mod common;
pub mod resource;

pub use common::*;
pub use resource::*;

use crate::state::AppState;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Common routes plus resource routes, with request tracing.
pub fn app(state: AppState) -> Router {
    common_routes_with_ready(state.clone())
        .merge(resource_routes(state))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
