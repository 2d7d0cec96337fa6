//! jsonapi-sdk: graph-driven JSON:API read layer.
//!
//! A [`ResourceGraph`] describes the exposed resource types. The [`JsonApiPipeline`]
//! parses JSON:API query strings, builds a validated query layer, executes it through
//! a [`DataSource`] and serializes a compound document.

mod case;
pub mod config;
pub mod definition;
pub mod document;
pub mod error;
pub mod graph;
pub mod handlers;
pub mod pipeline;
pub mod query;
pub mod repository;
pub mod response;
pub mod routes;
pub mod sql;
pub mod state;
pub mod telemetry;

#[cfg(test)]
mod fixtures;

pub use config::{load_from_dir, load_from_file, load_options_from_dir, resolve, ApiOptions, FullConfig, PluralizationStrategy};
pub use definition::{ResourceDefinition, ResourceDefinitions};
pub use document::{Document, DocumentSerializer};
pub use error::{AppError, ConfigError, DataAccessError, QueryError, SerializationError};
pub use graph::{ResourceGraph, ResourceGraphBuilder, ResourceTypeBuilder};
pub use pipeline::JsonApiPipeline;
pub use repository::{DataSource, InMemoryDataSource, PgDataSource, Record, Repository};
pub use response::JSONAPI_MEDIA_TYPE;
pub use routes::{app, common_routes, common_routes_with_ready, resource_routes};
pub use state::AppState;
pub use telemetry::init_tracing;
