//! Unified error type for framevault.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for a routing layer to derive an HTTP status code via [`Error::http_status`].

use std::fmt;

/// One failed key inside a multi-key operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFailure {
    /// The store key the operation targeted.
    pub key: String,
    /// Human-readable reason.
    pub reason: String,
}

impl fmt::Display for KeyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key, self.reason)
    }
}

/// Unified error type covering all failure modes in framevault.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "format", "stream").
        entity: String,
        /// The key or identifier that was looked up.
        id: String,
    },

    /// A record already exists and overwriting was not requested.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Some keys of a multi-key operation failed while others succeeded.
    #[error(
        "Partial failure in {operation}: {} succeeded, {} failed [{}]",
        succeeded.len(),
        failed.len(),
        failed.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    )]
    PartialFailure {
        /// The operation that was fanned out.
        operation: String,
        /// Keys that completed.
        succeeded: Vec<String>,
        /// Keys that did not.
        failed: Vec<KeyFailure>,
    },

    /// No connection can be provided (pool closed or connection closed).
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// A store command failed.
    #[error("Store error: {source}")]
    Store {
        /// The underlying store error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A JSON or TOML document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Conflict(_) => 409,
            Error::Validation(_) => 400,
            Error::PartialFailure { .. } => 500,
            Error::Unavailable(_) => 503,
            Error::Store { .. } => 500,
            Error::Io { .. } => 500,
            Error::Serialization(_) => 400,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Store`].
    pub fn store(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Store {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Error::Unavailable(message.into())
    }

    /// Convenience constructor for [`Error::PartialFailure`].
    pub fn partial(
        operation: impl Into<String>,
        succeeded: Vec<String>,
        failed: Vec<KeyFailure>,
    ) -> Self {
        Error::PartialFailure {
            operation: operation.into(),
            succeeded,
            failed,
        }
    }

    /// Whether this error means the entity is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
