//! Producer side of the log relay.
//!
//! A [`Logger`] posts structured events for one session key to a relay's
//! ingest endpoint and disables itself after repeated failures so that a
//! missing relay never slows the host application down.

pub mod config;
pub mod error;
pub mod guard;
pub mod logger;

pub use config::LoggerConfig;
pub use error::ClientError;
pub use guard::{DisableReason, ErrorGuard, ProducerState};
pub use logger::Logger;
pub use logrelay_core::{Level, Value};
