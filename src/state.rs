//! Shared application state for all routes. The graph inside the pipeline is frozen before serving.

use crate::pipeline::JsonApiPipeline;
use crate::repository::DataSource;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<JsonApiPipeline>,
    pub source: Arc<dyn DataSource>,
}

impl AppState {
    pub fn new(pipeline: JsonApiPipeline, source: impl DataSource + 'static) -> Self {
        AppState {
            pipeline: Arc::new(pipeline),
            source: Arc::new(source),
        }
    }
}
