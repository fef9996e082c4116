//! Log events.

use std::{
    fmt,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::{RelayError, Value, value::render_payload};

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl Level {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(RelayError::invalid_payload(format!(
                "unknown level '{other}'"
            ))),
        }
    }
}

/// One structured log record.
///
/// Immutable once built; the relay shares it behind an `Arc` between the
/// buffer and every subscriber it is broadcast to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub level: Level,
    #[serde(rename = "data")]
    pub payload: Vec<Value>,
    /// Unix epoch seconds.
    pub timestamp: i64,
    pub formatted: String,
}

impl Event {
    /// Build an event, rendering `formatted` from the payload.
    ///
    /// `timestamp` defaults to now.
    #[must_use]
    pub fn new(level: Level, payload: Vec<Value>, timestamp: Option<i64>) -> Self {
        let formatted = render_payload(&payload);
        Self {
            level,
            payload,
            timestamp: timestamp.unwrap_or_else(now),
            formatted,
        }
    }
}

/// Current Unix time in seconds.
#[must_use]
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
