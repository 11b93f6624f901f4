//! Identifiers for stored formats.
//!
//! A format is addressed by its URL. Ingested media keeps the URL it was
//! demultiplexed from; records arriving without one get a UUID-based URN.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// URL or URN naming one stored format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaUrl(String);

impl MediaUrl {
    /// Generate a fresh `urn:uuid:` identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("urn:uuid:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifier was produced by [`MediaUrl::generate`].
    pub fn is_generated(&self) -> bool {
        self.0
            .strip_prefix("urn:uuid:")
            .is_some_and(|rest| Uuid::parse_str(rest).is_ok())
    }
}

impl fmt::Display for MediaUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaUrl {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MediaUrl {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for MediaUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_urls_are_unique_urns() {
        let a = MediaUrl::generate();
        let b = MediaUrl::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("urn:uuid:"));
        assert!(a.is_generated());
    }

    #[test]
    fn plain_urls_are_not_generated() {
        let url = MediaUrl::from("file:///media/big_buck_bunny.mp4");
        assert!(!url.is_generated());
        assert_eq!(url.to_string(), "file:///media/big_buck_bunny.mp4");
    }

    #[test]
    fn serializes_transparently() {
        let url = MediaUrl::from("urn:test");
        assert_eq!(serde_json::to_string(&url).unwrap(), "\"urn:test\"");
    }
}
