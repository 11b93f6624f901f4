//! Configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! store, pool and expiry settings. Every section defaults sensibly so a
//! completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub pool: PoolConfig,
    pub ttl: TtlConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| Error::Serialization(format!("config parse error: {e}")))
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.pool.max_size == 0 {
            warnings.push("pool.max_size is 0; every acquire will fail".into());
        }
        if self.pool.grow_batch == 0 {
            warnings.push("pool.grow_batch is 0; it will be treated as 1".into());
        }
        if self.store.prefix.is_empty() {
            warnings.push("store.prefix is empty; keys will start with ':'".into());
        }
        if self.store.prefix.ends_with(':') {
            warnings.push(format!(
                "store.prefix '{}' ends with ':'; keys will contain '::'",
                self.store.prefix
            ));
        }
        if self.ttl.payload_secs > self.ttl.metadata_secs {
            warnings.push(
                "ttl.payload_secs exceeds ttl.metadata_secs; payloads will outlive their metadata"
                    .into(),
            );
        }
        for (name, secs) in [
            ("metadata_secs", self.ttl.metadata_secs),
            ("payload_secs", self.ttl.payload_secs),
            ("ephemeral_secs", self.ttl.ephemeral_secs),
        ] {
            if secs == 0 {
                warnings.push(format!("ttl.{name} is 0; entries will never expire"));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Key-value store location and namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the SQLite file backing the store.
    pub path: PathBuf,
    /// How long a connection waits for a competing writer.
    pub busy_timeout_ms: u64,
    /// Namespace root prepended to every key.
    pub prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/framevault/store.db"),
            busy_timeout_ms: 5_000,
            prefix: "framevault".into(),
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Connection pool sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Hard cap on live connections.
    pub max_size: usize,
    /// Connections opened per growth step once the pool is non-empty.
    pub grow_batch: usize,
    /// Upper bound on how long `close_all` waits for connections to close.
    pub close_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            grow_batch: 5,
            close_timeout_ms: 2_000,
        }
    }
}

impl PoolConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

/// Expiry of stored media. Zero disables expiry for that class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    /// Packet and frame metadata hashes.
    pub metadata_secs: u64,
    /// Packet and frame payload buffers.
    pub payload_secs: u64,
    /// Ephemeral blobs.
    pub ephemeral_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            metadata_secs: 3 * 24 * 3600,
            payload_secs: 24 * 3600,
            ephemeral_secs: 3600,
        }
    }
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

impl TtlConfig {
    pub fn metadata(&self) -> Option<Duration> {
        secs(self.metadata_secs)
    }

    pub fn payload(&self) -> Option<Duration> {
        secs(self.payload_secs)
    }

    pub fn ephemeral(&self) -> Option<Duration> {
        secs(self.ephemeral_secs)
    }
}
