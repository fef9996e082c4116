//! Session keys.

use std::{borrow::Borrow, fmt, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::RelayError;

/// Producer-chosen identifier partitioning events and subscribers.
///
/// Opaque and case-sensitive. The only rule is that it is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(Arc<str>);

impl SessionKey {
    /// Create a session key.
    ///
    /// # Errors
    /// Returns `InvalidPayload` if `key` is empty.
    pub fn new(key: impl AsRef<str>) -> Result<Self, RelayError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(RelayError::invalid_payload("key must not be empty"));
        }
        Ok(Self(Arc::from(key)))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SessionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionKey {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for SessionKey {
    type Error = RelayError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl Serialize for SessionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SessionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            SessionKey::new(""),
            Err(RelayError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let lower = SessionKey::new("session").unwrap();
        let upper = SessionKey::new("Session").unwrap();
        assert_ne!(lower, upper);
    }

    #[test]
    fn test_deserialize_rejects_empty() {
        assert!(serde_json::from_str::<SessionKey>("\"\"").is_err());
        let key: SessionKey = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(key.as_str(), "abc");
    }
}
