//! Key-value engine backing the media store.
//!
//! Provides the small command set the key space needs (hashes, raw strings,
//! sorted sets, per-key millisecond expiry) on top of an SQLite file. Each
//! [`KvConnection`] owns one SQLite connection; commands run on the blocking
//! thread pool so callers never stall the async runtime.

mod commands;
mod schema;

pub use commands::{KeyTtl, ScoredMember};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fv_core::config::StoreConfig;
use fv_core::{Error, Result};
use parking_lot::Mutex;
use rusqlite::Connection;

use crate::pool::ManageConnection;

/// Failures raised inside the engine before they are mapped to [`Error`].
#[derive(Debug, thiserror::Error)]
pub(crate) enum KvError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("WRONGTYPE key '{key}' holds a {found} value, not a {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("key '{key}' has unrecognised type '{kind}'")]
    Corrupt { key: String, kind: String },

    #[error("cannot create store directory: {0}")]
    Io(#[from] std::io::Error),
}

impl From<KvError> for Error {
    fn from(e: KvError) -> Self {
        Error::store(e)
    }
}

/// Opens [`KvConnection`]s on one SQLite file.
#[derive(Debug)]
pub struct KvManager {
    path: PathBuf,
    busy_timeout: Duration,
    next_id: AtomicU64,
}

impl KvManager {
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.path.clone(), config.busy_timeout())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open(path: &Path, busy_timeout: Duration) -> std::result::Result<Connection, KvError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    schema::prepare(&conn, busy_timeout)?;
    Ok(conn)
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Internal(format!("store task failed: {e}"))
}

#[async_trait]
impl ManageConnection for KvManager {
    type Connection = KvConnection;

    async fn connect(&self) -> Result<KvConnection> {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        let conn = tokio::task::spawn_blocking(move || open(&path, busy_timeout))
            .await
            .map_err(join_error)??;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(conn = id, path = %self.path.display(), "opened store connection");
        Ok(KvConnection {
            id,
            closed: AtomicBool::new(false),
            slot: Arc::new(Mutex::new(Some(conn))),
        })
    }

    async fn close(&self, conn: &KvConnection) -> Result<()> {
        conn.shutdown().await
    }
}

/// One connection to the key-value engine.
///
/// Once closed, every command fails with [`Error::Unavailable`].
pub struct KvConnection {
    id: u64,
    closed: AtomicBool,
    slot: Arc<Mutex<Option<Connection>>>,
}

impl std::fmt::Debug for KvConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl KvConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the underlying SQLite connection. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let slot = Arc::clone(&self.slot);
        let id = self.id;
        tokio::task::spawn_blocking(move || -> Result<()> {
            let Some(conn) = slot.lock().take() else {
                return Ok(());
            };
            conn.close()
                .map_err(|(_, e)| Error::store(KvError::Sqlite(e)))?;
            tracing::debug!(conn = id, "closed store connection");
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    /// Run `f` against the SQLite connection on the blocking pool.
    pub(crate) async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> std::result::Result<T, KvError> + Send + 'static,
    {
        if self.is_closed() {
            return Err(Error::unavailable("connection closed"));
        }
        let slot = Arc::clone(&self.slot);
        tokio::task::spawn_blocking(move || -> Result<T> {
            let mut guard = slot.lock();
            let conn = guard
                .as_mut()
                .ok_or_else(|| Error::unavailable("connection closed"))?;
            f(conn).map_err(Error::from)
        })
        .await
        .map_err(join_error)?
    }
}
