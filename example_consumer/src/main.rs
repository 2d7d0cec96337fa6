//! Example consumer: serves the resources in `config/resources.json` from PostgreSQL.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Env: `DATABASE_URL`, `CONFIG_DIR` (default `example_consumer/config`), `BIND_ADDR`, `JSONAPI_*`.

use jsonapi_sdk::{app, init_tracing, load_from_dir, load_options_from_dir, resolve, AppState, JsonApiPipeline, PgDataSource};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "example_consumer/config".into());
    let mut options = load_options_from_dir(&config_dir).await?;
    // environment wins over options.json
    if std::env::vars().any(|(k, _)| k.starts_with("JSONAPI_")) {
        options = jsonapi_sdk::ApiOptions::from_env()?;
    }
    let config = load_from_dir(&config_dir).await?;
    let graph = Arc::new(resolve(&config, &options)?);

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/blog".into());
    let source = PgDataSource::connect(&database_url, 5).await?;

    let state = AppState::new(JsonApiPipeline::new(graph, options), source);
    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&bind).await?;
    tracing::info!("Example consumer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
