//! The thin `axum` surface, grounded on `agenticlaw-gateway/src/server.rs`:
//! `/health` and a feedback-submission endpoint. Explicitly out of core
//! scope per the engine design — kept as thin as the teacher keeps its own
//! HTTP surface.

use axum::{extract::State, routing::{get, post}, Json, Router};
use mallku_correlation::{CorrelationEngine, CorrelationFeedback};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<CorrelationEngine>,
}

pub async fn serve(state: ServerState, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health))
        .route("/feedback", post(submit_feedback))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!(%addr, "mallku http surface listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health(State(state): State<ServerState>) -> Json<serde_json::Value> {
    let stats = state.engine.stats().await;
    Json(serde_json::json!({ "status": "ok", "stats": stats }))
}

async fn submit_feedback(State(state): State<ServerState>, Json(feedback): Json<CorrelationFeedback>) -> Json<serde_json::Value> {
    state.engine.add_feedback(feedback).await;
    Json(serde_json::json!({ "status": "accepted" }))
}
