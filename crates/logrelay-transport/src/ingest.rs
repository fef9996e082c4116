//! Producer ingestion endpoint.

use axum::{Json, body::Bytes, extract::State};
use logrelay_core::IngestRequest;
use serde::Serialize;

use crate::{ApiError, RelayState};

/// Body of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    success: bool,
}

/// `POST /logger`
///
/// Decodes the body, hands it to the relay and acknowledges. The ack does
/// not depend on whether anyone is watching the key.
///
/// # Errors
/// Returns `400` for malformed or incomplete payloads.
pub async fn ingest_handler(
    State(state): State<RelayState>,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let request = IngestRequest::from_slice(&body).inspect_err(|e| {
        tracing::debug!(error = %e, "Rejected ingestion payload");
    })?;
    state.relay.ingest_request(request);
    Ok(Json(IngestResponse { success: true }))
}
