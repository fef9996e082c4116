//! Wire protocol shared by producers, subscribers and the relay.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::{Event, Level, RelayError, SessionKey, Value};

/// Message from the relay to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Registration accepted; carries the replay.
    Registered {
        key: SessionKey,
        #[serde(rename = "bufferedLogs")]
        buffered_logs: Vec<Arc<Event>>,
    },
    /// One live event.
    Log(Arc<Event>),
    /// The key's history was cleared.
    Cleared,
    /// The previous client message was rejected.
    Error { error: String },
}

impl ServerMessage {
    /// Error reply for a rejected client message.
    #[must_use]
    pub fn error(err: &RelayError) -> Self {
        let error = match err {
            RelayError::UnknownSubscriberAction(reason) => reason.clone(),
            other => other.to_string(),
        };
        Self::Error { error }
    }
}

/// Message from a subscriber to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Watch a key, replacing any previous registration.
    Register { key: SessionKey },
    /// Clear a key's history and notify its subscribers.
    Clear { key: SessionKey },
}

impl ClientMessage {
    /// Decode a subscriber message.
    ///
    /// # Errors
    /// Returns `UnknownSubscriberAction` for malformed JSON, a missing or
    /// unknown action, or a missing key.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let Ok(Json::Object(raw)) = serde_json::from_str::<Json>(text) else {
            return Err(RelayError::unknown_action("Invalid message format"));
        };

        let action = raw
            .get("action")
            .and_then(Json::as_str)
            .ok_or_else(|| RelayError::unknown_action("Invalid message format"))?;

        let key = || {
            raw.get("key")
                .and_then(Json::as_str)
                .and_then(|k| SessionKey::new(k).ok())
                .ok_or_else(|| RelayError::unknown_action("Key is required"))
        };

        match action {
            "register" => Ok(Self::Register { key: key()? }),
            "clear" => Ok(Self::Clear { key: key()? }),
            other => Err(RelayError::unknown_action(format!(
                "Unknown action: {other}"
            ))),
        }
    }
}

/// A producer's request to ingest one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestRequest {
    pub key: SessionKey,
    pub level: Level,
    pub data: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl IngestRequest {
    /// Decode an ingestion body.
    ///
    /// # Errors
    /// Returns `InvalidPayload` for malformed JSON, missing `key`, `level`
    /// or `data`, an empty key, an unknown level, non-array data or a
    /// non-integer timestamp.
    pub fn from_slice(body: &[u8]) -> Result<Self, RelayError> {
        let mut raw = match serde_json::from_slice::<Json>(body) {
            Ok(Json::Object(raw)) => raw,
            Ok(_) => return Err(RelayError::invalid_payload("body must be a JSON object")),
            Err(e) => return Err(RelayError::invalid_payload(format!("malformed JSON: {e}"))),
        };

        let key = match raw.remove("key") {
            Some(Json::String(key)) => SessionKey::new(key)?,
            Some(_) => return Err(RelayError::invalid_payload("key must be a string")),
            None => return Err(RelayError::invalid_payload("missing field 'key'")),
        };

        let level = match raw.remove("level") {
            Some(Json::String(level)) => level.parse::<Level>()?,
            Some(_) => return Err(RelayError::invalid_payload("level must be a string")),
            None => return Err(RelayError::invalid_payload("missing field 'level'")),
        };

        let data = match raw.remove("data") {
            Some(Json::Array(items)) => items.into_iter().map(Value::from).collect(),
            Some(_) => return Err(RelayError::invalid_payload("data must be an array")),
            None => return Err(RelayError::invalid_payload("missing field 'data'")),
        };

        let timestamp = match raw.remove("timestamp") {
            None | Some(Json::Null) => None,
            Some(Json::Number(n)) => Some(n.as_i64().ok_or_else(|| {
                RelayError::invalid_payload("timestamp must be an integer")
            })?),
            Some(_) => return Err(RelayError::invalid_payload("timestamp must be an integer")),
        };

        Ok(Self {
            key,
            level,
            data,
            timestamp,
        })
    }
}
