//! Entity-level operations over the key space.
//!
//! Every multi-key operation fans out one task per key, each on its own pooled
//! connection. Within a task a key is always cleared before it is rewritten;
//! across tasks there is no ordering and no atomicity, so failures are
//! collected and reported per key as [`Error::PartialFailure`].

mod formats;
mod media;
mod query;

pub use query::MediaQuery;

use std::time::Duration;

use bytes::Bytes;
use fv_core::config::{PoolConfig, StoreConfig, TtlConfig};
use fv_core::{Error, KeyFailure, Result};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use uuid::Uuid;

use crate::keys::KeySpace;
use crate::kv::KvManager;
use crate::mapping::FieldMap;
use crate::pool::{Pool, Pooled};

/// One key written by a store operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyWrite {
    pub key: String,
    #[serde(flatten)]
    pub action: WriteAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WriteAction {
    /// A metadata hash was replaced.
    Hash { fields: usize },
    /// A raw payload was stored.
    Payload { bytes: usize },
    /// A sorted-set entry was added or re-scored.
    Index { score: f64 },
}

type Task<'a, T> = BoxFuture<'a, Result<T>>;

/// Await every task and collect the results in order.
///
/// A lone failing key surfaces its own error; anything else that fails is
/// reported as a partial failure listing every key.
async fn fan_out<T>(operation: &str, tasks: Vec<(String, Task<'_, T>)>) -> Result<Vec<T>> {
    let (keys, futures): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let results = join_all(futures).await;

    let mut values = Vec::with_capacity(results.len());
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    let mut first_error = None;
    for (key, result) in keys.into_iter().zip(results) {
        match result {
            Ok(value) => {
                values.push(value);
                succeeded.push(key);
            }
            Err(e) => {
                failed.push(KeyFailure {
                    key,
                    reason: e.to_string(),
                });
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        None => Ok(values),
        Some(e) if succeeded.is_empty() && failed.len() == 1 => Err(e),
        Some(_) => {
            tracing::warn!(
                operation,
                succeeded = succeeded.len(),
                failed = failed.len(),
                "multi-key operation partially failed"
            );
            Err(Error::partial(operation, succeeded, failed))
        }
    }
}

/// Stores and retrieves formats, streams, packets and frames.
#[derive(Clone)]
pub struct MediaStore {
    pool: Pool<KvManager>,
    keys: KeySpace,
    ttl: TtlConfig,
}

impl MediaStore {
    pub fn new(pool: Pool<KvManager>, keys: KeySpace, ttl: TtlConfig) -> Self {
        Self { pool, keys, ttl }
    }

    /// Build a store from configuration and check that the backing file can
    /// be opened.
    pub async fn open(store: &StoreConfig, pool: &PoolConfig, ttl: &TtlConfig) -> Result<Self> {
        let pool = Pool::new(KvManager::from_config(store), pool.clone());
        drop(pool.acquire().await?);
        tracing::info!(
            path = %store.path.display(),
            prefix = %store.prefix,
            "opened media store"
        );
        Ok(Self::new(pool, KeySpace::new(store.prefix.clone()), ttl.clone()))
    }

    pub fn pool(&self) -> &Pool<KvManager> {
        &self.pool
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Close every pooled connection. The store reconnects on next use.
    pub async fn close(&self) -> Result<usize> {
        self.pool.close_all().await
    }

    async fn conn(&self) -> Result<Pooled<KvManager>> {
        self.pool.acquire().await
    }

    // -- per-key tasks ------------------------------------------------------

    /// Replace the hash at `key`.
    async fn write_hash(
        &self,
        key: String,
        fields: FieldMap,
        ttl: Option<Duration>,
    ) -> Result<KeyWrite> {
        let conn = self.conn().await?;
        let count = fields.len();
        conn.hset_ex(&key, fields, ttl).await?;
        tracing::debug!(key = %key, fields = count, "wrote hash");
        Ok(KeyWrite {
            key,
            action: WriteAction::Hash { fields: count },
        })
    }

    /// Replace the raw value at `key`.
    async fn write_payload(
        &self,
        key: String,
        data: Bytes,
        ttl: Option<Duration>,
    ) -> Result<KeyWrite> {
        let conn = self.conn().await?;
        let bytes = data.len();
        conn.set_ex(&key, data, ttl).await?;
        tracing::debug!(key = %key, bytes, "wrote payload");
        Ok(KeyWrite {
            key,
            action: WriteAction::Payload { bytes },
        })
    }

    async fn index_entry(&self, index: String, score: f64, member: &str) -> Result<KeyWrite> {
        let conn = self.conn().await?;
        conn.zadd(&index, score, member).await?;
        Ok(KeyWrite {
            key: index,
            action: WriteAction::Index { score },
        })
    }

    // -- content listing and blobs ------------------------------------------

    /// URLs of stored formats, most recently stored first.
    pub async fn list_content(&self, start: usize, limit: Option<usize>) -> Result<Vec<String>> {
        // Ranks count back from the newest entry.
        let Ok(start) = i64::try_from(start) else {
            return Ok(Vec::new());
        };
        let stop = -start - 1;
        let first = match limit {
            Some(0) => return Ok(Vec::new()),
            // A limit reaching past the oldest entry is no limit.
            Some(n) => i64::try_from(n - 1)
                .ok()
                .and_then(|span| stop.checked_sub(span))
                .unwrap_or(0),
            None => 0,
        };
        let conn = self.conn().await?;
        let entries = conn.zrange(&self.keys.content_index(), first, stop).await?;
        Ok(entries.into_iter().rev().map(|e| e.member).collect())
    }

    /// Keep `data` for the ephemeral lifetime and return its id.
    pub async fn store_blob(&self, data: Bytes) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let key = self.keys.blob(&id);
        let conn = self.conn().await?;
        conn.set_ex(&key, data, self.ttl.ephemeral()).await?;
        tracing::debug!(key = %key, "stored blob");
        Ok(id)
    }

    pub async fn retrieve_blob(&self, id: &str) -> Result<Bytes> {
        let key = self.keys.blob(id);
        let conn = self.conn().await?;
        conn.get(&key)
            .await?
            .ok_or_else(|| Error::not_found("blob", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(key: &str) -> (String, Task<'static, u32>) {
        (key.to_string(), async { Ok::<u32, Error>(1) }.boxed())
    }

    fn failing(key: &str) -> (String, Task<'static, u32>) {
        (
            key.to_string(),
            async { Err::<u32, Error>(Error::unavailable("connection closed")) }.boxed(),
        )
    }

    #[tokio::test]
    async fn fan_out_keeps_task_order() {
        let values = fan_out("test", vec![ok("a"), ok("b")]).await.unwrap();
        assert_eq!(values, [1, 1]);
    }

    #[tokio::test]
    async fn single_failure_keeps_its_error() {
        let err = fan_out("test", vec![failing("a")]).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn mixed_results_are_partial_failures() {
        let err = fan_out("store_format", vec![ok("a"), failing("b"), ok("c")])
            .await
            .unwrap_err();
        match err {
            Error::PartialFailure {
                operation,
                succeeded,
                failed,
            } => {
                assert_eq!(operation, "store_format");
                assert_eq!(succeeded, ["a", "c"]);
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].key, "b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn key_writes_serialize_flat() {
        let write = KeyWrite {
            key: "fv:u".into(),
            action: WriteAction::Hash { fields: 3 },
        };
        assert_eq!(
            serde_json::to_string(&write).unwrap(),
            r#"{"key":"fv:u","action":"hash","fields":3}"#
        );
    }
}
