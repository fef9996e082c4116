//! Health and stats endpoints.

use axum::{Json, extract::State};
use logrelay_core::RelayStats;
use serde::Serialize;

use crate::RelayState;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// `GET /health`
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /stats`
pub async fn stats(State(state): State<RelayState>) -> Json<RelayStats> {
    Json(state.relay.stats())
}
