//! HTTP and WebSocket endpoints for the log relay.
//!
//! Provides:
//! - `POST /logger` - Producer ingestion
//! - `GET /ws` - Subscriber WebSocket (register / clear)
//! - `GET /viewer/{key}` - Browser viewer page
//! - `GET /health`, `GET /stats`

pub mod error;
pub mod health;
pub mod ingest;
pub mod router;
pub mod viewer;
pub mod websocket;

pub use error::ApiError;
pub use router::{RelayState, create_router};
