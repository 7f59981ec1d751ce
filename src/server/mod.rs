//! # WebSocket Server Module
//!
//! Serves the live telemetry feed to browser dashboards.
//!
//! ## Routes
//!
//! - `GET {server.path}` (default `/ws`): WebSocket upgrade, any origin. The
//!   server pushes one JSON snapshot per update.
//! - `GET /snapshot`: current snapshot as JSON
//! - `GET /health`: link state, client count, categories seen, ingest counters
//!
//! ## Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8080/ws');
//! ws.onmessage = (event) => {
//!   const data = JSON.parse(event.data);
//!   console.log(data.heading, data.roll, data.pitch);
//! };
//! ```

pub mod hub;
pub mod session;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::error::{BridgeError, Result};
use crate::ingest::{IngestStats, IngestStatsSnapshot, LinkState};
use crate::telemetry::{Snapshot, TelemetryStore};

pub use hub::{BroadcastReport, ClientId, ClientRegistry, ClientSlot, Payload};
pub use session::{run_session, SessionEnd, SessionSettings};

/// Shared context handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TelemetryStore>,
    pub registry: Arc<ClientRegistry>,
    pub link: watch::Receiver<LinkState>,
    pub stats: Arc<IngestStats>,
    pub settings: SessionSettings,
}

/// Body of `GET /health`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub link: LinkState,
    pub clients: usize,
    pub categories_seen: Vec<&'static str>,
    pub last_update: i64,
    pub stats: IngestStatsSnapshot,
    pub version: &'static str,
}

/// Build the router with the WebSocket endpoint mounted at `ws_path`
pub fn build_router(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(websocket_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

/// Serve `router` on `listener` until `shutdown` turns true
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!("WebSocket server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .map_err(|e| BridgeError::Server(format!("Server error: {}", e)))?;

    info!("WebSocket server shut down");
    Ok(())
}

/// GET {path}: upgrade and run a client session
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let registry = Arc::clone(&state.registry);
    let store = Arc::clone(&state.store);
    let settings = state.settings;

    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        run_session(sink, stream, registry, store, settings).await;
    })
}

/// GET /snapshot
async fn snapshot_handler(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.store.snapshot())
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.store.snapshot();
    let link = *state.link.borrow();

    Json(HealthResponse {
        link,
        clients: state.registry.len(),
        categories_seen: snapshot.categories_seen().into_iter().map(|c| c.name()).collect(),
        last_update: snapshot.timestamp,
        stats: state.stats.snapshot(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
