//! Router assembly.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use logrelay_core::RelayCore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{health, ingest, viewer, websocket};

/// Handler state: the relay every endpoint talks to.
#[derive(Clone)]
pub struct RelayState {
    pub relay: Arc<RelayCore>,
}

impl RelayState {
    #[must_use]
    pub const fn new(relay: Arc<RelayCore>) -> Self {
        Self { relay }
    }
}

/// Create the relay router.
///
/// # Example
/// ```ignore
/// let relay = Arc::new(RelayCore::new(RelayConfig::default())?);
/// axum::serve(listener, create_router(relay)).await?;
/// ```
#[must_use]
pub fn create_router(relay: Arc<RelayCore>) -> Router {
    Router::new()
        .route("/logger", post(ingest::ingest_handler))
        .route("/ws", get(websocket::ws_handler))
        .route("/viewer/{key}", get(viewer::viewer_handler))
        .route("/health", get(health::health_check))
        .route("/stats", get(health::stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(RelayState::new(relay))
}
