//! fv-core: shared types, errors, configuration and media records.
//!
//! This crate is the foundational dependency for the other fv-* crates,
//! providing the unified error type, the configuration tree, and the
//! explicit record types for formats, streams, packets and frames.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, KeyFailure, Result};
pub use ids::MediaUrl;
pub use media::*;
