//! HTTP error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use logrelay_core::RelayError;
use serde::Serialize;

/// Error returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::Relay(RelayError::InvalidPayload(reason)) => {
                (StatusCode::BAD_REQUEST, "invalid_payload", Some(reason))
            }
            Self::Relay(RelayError::UnknownSubscriberAction(reason)) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(reason))
            }
            Self::Relay(err) => {
                tracing::error!(error = %err, "internal relay error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        (status, Json(ErrorResponse { error, message })).into_response()
    }
}
