//! HTTP surface of the scene server.
//!
//! Endpoints:
//! - GET /         - WebSocket upgrade (observers and controllers)
//! - GET /ws       - same, for clients that expect a path
//! - GET /health   - liveness and connection count
//! - GET /state    - current scene snapshot

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use tabletop_shared::SceneSnapshot;

use crate::connection::handle_socket;
use crate::context::SceneContext;

/// Build the axum router with all endpoints.
pub fn router(ctx: Arc<SceneContext>) -> Router {
    Router::new()
        .route("/", get(upgrade))
        .route("/ws", get(upgrade))
        .route("/health", get(health))
        .route("/state", get(state))
        .with_state(ctx)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub objects: usize,
}

async fn upgrade(ws: WebSocketUpgrade, State(ctx): State<Arc<SceneContext>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn health(State(ctx): State<Arc<SceneContext>>) -> Json<HealthResponse> {
    let objects = ctx.store().lock().await.len();
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: ctx.broadcaster().connection_count(),
        objects,
    })
}

async fn state(State(ctx): State<Arc<SceneContext>>) -> Json<SceneSnapshot> {
    let snapshot = ctx.store().lock().await.snapshot();
    Json(snapshot)
}
