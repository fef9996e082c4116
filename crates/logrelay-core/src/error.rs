//! Relay error kinds.

use thiserror::Error;

use crate::registry::SubscriberId;

/// Errors produced by the relay core.
///
/// Only `InvalidPayload` and `UnknownSubscriberAction` ever reach a caller
/// over the wire. `DeliveryFailure` is recovered inside the registry and
/// `InvalidConfig` can only happen at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Malformed or incomplete ingestion request.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    /// Subscriber sent a message the relay does not understand.
    #[error("{0}")]
    UnknownSubscriberAction(String),
    /// A message could not be handed to a subscriber's outbound queue.
    #[error("Delivery to subscriber {subscriber} failed: {reason}")]
    DeliveryFailure {
        subscriber: SubscriberId,
        reason: DeliveryFailureReason,
    },
    /// Relay constructed with an unusable configuration.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Why a broadcast could not reach a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryFailureReason {
    /// The subscriber's outbound queue is full.
    #[error("outbound queue saturated")]
    Saturated,
    /// The subscriber's connection has gone away.
    #[error("connection closed")]
    Closed,
}

impl RelayError {
    /// Shorthand for an `InvalidPayload` error.
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload(reason.into())
    }

    /// Shorthand for an `UnknownSubscriberAction` error.
    pub fn unknown_action(reason: impl Into<String>) -> Self {
        Self::UnknownSubscriberAction(reason.into())
    }
}
