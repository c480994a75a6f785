//! HTTP status endpoint.

use crate::client::Client;
use crate::shard::ShardInfo;
use anyhow::Result;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Routes: `GET /health` and `GET /shards`.
pub fn router(client: Arc<Client>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/shards", get(shards_handler))
        .with_state(client)
}

/// Serve the status routes until the listener fails.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn serve(client: Arc<Client>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Status endpoint listening on {}", addr);
    axum::serve(listener, router(client)).await?;
    Ok(())
}

async fn health_handler(State(client): State<Arc<Client>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "ready": client.is_ready(),
        "shards": client.shards().len(),
        "latency_ms": client.latency().map(|l| l.as_secs_f64() * 1000.0),
    }))
}

async fn shards_handler(State(client): State<Arc<Client>>) -> Json<Vec<ShardInfo>> {
    Json(client.shards().iter().map(|shard| shard.info()).collect())
}
