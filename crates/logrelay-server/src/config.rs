//! Server configuration loaded from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use logrelay_core::RelayConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub relay: RelayConfig,
    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `LOGRELAY_BIND_ADDR`: listen address (default: "0.0.0.0:8080")
    /// - `LOGRELAY_BUFFER_SIZE`: events kept per key (default: 100)
    /// - `LOGRELAY_SUBSCRIBER_QUEUE`: outbound messages queued per subscriber (default: 256)
    /// - `LOGRELAY_LOG_JSON`: "1" or "true" for JSON logs
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = var("LOGRELAY_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("LOGRELAY_BIND_ADDR is not a socket address")?;

        let defaults = RelayConfig::default();
        let relay = RelayConfig {
            buffer_capacity: parse_or(&var, "LOGRELAY_BUFFER_SIZE", defaults.buffer_capacity)?,
            subscriber_queue: parse_or(
                &var,
                "LOGRELAY_SUBSCRIBER_QUEUE",
                defaults.subscriber_queue,
            )?,
        };
        relay.validate()?;

        let log_json = var("LOGRELAY_LOG_JSON")
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"));

        Ok(Self {
            bind_addr,
            relay,
            log_json,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .with_context(|| format!("{name} is not a valid number: {raw:?}"))
    })
}
