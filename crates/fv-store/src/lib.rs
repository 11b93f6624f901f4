//! fv-store: persistence for demultiplexed media.
//!
//! - [`pool`]: bounded connection pool with FIFO waiters.
//! - [`kv`]: the key-value engine the pool hands out connections to.
//! - [`mapping`]: conversion between media records and flat field maps.
//! - [`keys`]: layout of the key space.
//! - [`store`]: [`MediaStore`], the entity-level API.

pub mod keys;
pub mod kv;
pub mod mapping;
pub mod pool;
pub mod store;

pub use keys::{KeySpace, MediaKind};
pub use kv::{KeyTtl, KvConnection, KvManager, ScoredMember};
pub use mapping::FieldMap;
pub use pool::{ManageConnection, Pool, PoolStatus, Pooled};
pub use store::{KeyWrite, MediaQuery, MediaStore, WriteAction};
