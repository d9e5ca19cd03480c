use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::routing::get;
use axum::{Json, Router};
use ingest_runtime::{
    build_router, DatatypeRegistry, ExecutorConfig, InMemoryOutputRegistry, ServerConfig,
    UploadApiState, UploadExecutor,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,ingest_runtime=info,ingest_server=info")
        }))
        .init();

    let server_config = ServerConfig::from_env().map_err(|e| anyhow!(e))?;
    let executor_config = ExecutorConfig::from_env().map_err(|e| anyhow!(e))?;

    let listener = tokio::net::TcpListener::bind(&server_config.addr).await?;
    let executor = UploadExecutor::new(
        Arc::new(InMemoryOutputRegistry::new()),
        Arc::new(DatatypeRegistry::builtin()),
        executor_config.clone(),
    )?;
    let state = UploadApiState::new(Arc::new(executor));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .merge(build_router(state));

    tracing::info!(
        "ingest server listening on http://{} max_concurrent_units={}",
        server_config.addr,
        executor_config.max_concurrent_units
    );
    axum::serve(listener, app).await?;
    Ok(())
}
