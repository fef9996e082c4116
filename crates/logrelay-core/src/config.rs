//! Relay configuration.

use serde::{Deserialize, Serialize};

use crate::RelayError;

/// Default number of events kept per key.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Default depth of each subscriber's outbound queue.
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 256;

/// Relay configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Events retained per session key; the oldest is evicted beyond this.
    pub buffer_capacity: usize,

    /// Messages a subscriber may have in flight before it is dropped as
    /// too slow.
    pub subscriber_queue: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
        }
    }
}

impl RelayConfig {
    /// Config with the given buffer capacity and default queue depth.
    #[must_use]
    pub fn with_capacity(buffer_capacity: usize) -> Self {
        Self {
            buffer_capacity,
            ..Self::default()
        }
    }

    /// Check that the config is usable.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if either bound is zero.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.buffer_capacity < 1 {
            return Err(RelayError::InvalidConfig(
                "buffer capacity must be at least 1".into(),
            ));
        }
        if self.subscriber_queue < 1 {
            return Err(RelayError::InvalidConfig(
                "subscriber queue must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
