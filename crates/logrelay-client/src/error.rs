use thiserror::Error;

use crate::guard::DisableReason;

/// Reasons a send did not reach the relay.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("producer is {0}")]
    Disabled(DisableReason),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relay rejected event ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid logger config: {0}")]
    InvalidConfig(String),
}
