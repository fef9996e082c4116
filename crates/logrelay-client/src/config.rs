use std::time::Duration;

use serde::Deserialize;

use crate::ClientError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_DISABLE_ON_ERRORS: u32 = 5;

/// Producer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerConfig {
    /// Full ingest URL, e.g. `http://localhost:8080/logger`.
    pub server_url: String,
    /// Session key every event is tagged with.
    pub key: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout", with = "millis")]
    pub timeout: Duration,
    /// Consecutive failures before the producer disables itself. Zero never disables.
    #[serde(default = "default_disable_on_errors")]
    pub disable_on_errors: u32,
}

impl LoggerConfig {
    pub fn new(server_url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            key: key.into(),
            timeout: DEFAULT_TIMEOUT,
            disable_on_errors: DEFAULT_DISABLE_ON_ERRORS,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_disable_on_errors(mut self, threshold: u32) -> Self {
        self.disable_on_errors = threshold;
        self
    }

    /// Check the URL scheme and the timeout.
    pub fn validate(&self) -> Result<(), ClientError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ClientError::InvalidConfig(format!(
                "server_url must be an http(s) URL, got {:?}",
                self.server_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::InvalidConfig("timeout must be non-zero".into()));
        }
        Ok(())
    }
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

const fn default_disable_on_errors() -> u32 {
    DEFAULT_DISABLE_ON_ERRORS
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
