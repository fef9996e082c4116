//! Core of the log relay.
//!
//! This crate provides the fundamental building blocks:
//! - `KeyedRingBuffer` - Bounded per-key event history
//! - `SubscriberRegistry` - Which live connections watch which key
//! - `RelayCore` - Ingestion, replay-on-register and fan-out
//! - `Event` / `Value` - Structured log records and their rendering
//! - Wire protocol types shared with transports and producers

pub mod config;
pub mod error;
pub mod event;
pub mod key;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod ring_buffer;
pub mod value;

pub use config::RelayConfig;
pub use error::RelayError;
pub use event::{Event, Level};
pub use key::SessionKey;
pub use protocol::{ClientMessage, IngestRequest, ServerMessage};
pub use registry::{SubscriberId, SubscriberRegistry};
pub use relay::{Connection, ConnectionState, RelayCore, RelayStats};
pub use ring_buffer::KeyedRingBuffer;
pub use value::Value;
