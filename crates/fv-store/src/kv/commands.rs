//! Commands understood by a [`KvConnection`].
//!
//! Semantics follow the familiar Redis commands of the same names: writing a
//! key of the wrong type fails with `WRONGTYPE`, reading a missing key yields
//! an empty result, and an expired key behaves exactly like a missing one.
//! Expired keys are deleted by whichever command finds them first.

use std::ops::Bound;
use std::time::Duration;

use bytes::Bytes;
use fv_core::Result;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{KvConnection, KvError};
use crate::mapping::FieldMap;

/// Remaining lifetime of a key, as reported by [`KvConnection::pttl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Expires(Duration),
}

/// One sorted-set entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Hash,
    String,
    ZSet,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Kind::Hash => "hash",
            Kind::String => "string",
            Kind::ZSet => "zset",
        }
    }

    fn parse(key: &str, kind: &str) -> std::result::Result<Self, KvError> {
        match kind {
            "hash" => Ok(Kind::Hash),
            "string" => Ok(Kind::String),
            "zset" => Ok(Kind::ZSet),
            other => Err(KvError::Corrupt {
                key: key.to_string(),
                kind: other.to_string(),
            }),
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn deadline(ttl: Duration) -> i64 {
    let ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_ms().saturating_add(ms)
}

/// Type of a live key, deleting it first if it has expired.
fn live_kind(conn: &Connection, key: &str) -> std::result::Result<Option<Kind>, KvError> {
    let row: Option<(String, Option<i64>)> = conn
        .query_row(
            "SELECT kind, expires_at FROM kv_keys WHERE key = ?1",
            [key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((_, Some(at))) if at <= now_ms() => {
            conn.execute("DELETE FROM kv_keys WHERE key = ?1", [key])?;
            Ok(None)
        }
        Some((kind, _)) => Kind::parse(key, &kind).map(Some),
    }
}

/// Whether `key` is live and of type `expected`.
fn check_kind(
    conn: &Connection,
    key: &str,
    expected: Kind,
) -> std::result::Result<bool, KvError> {
    match live_kind(conn, key)? {
        None => Ok(false),
        Some(found) if found == expected => Ok(true),
        Some(found) => Err(KvError::WrongType {
            key: key.to_string(),
            expected: expected.as_str(),
            found: found.as_str(),
        }),
    }
}

/// Make sure `key` exists with type `kind`, creating it without expiry.
fn claim(conn: &Connection, key: &str, kind: Kind) -> std::result::Result<(), KvError> {
    if !check_kind(conn, key, kind)? {
        conn.execute(
            "INSERT INTO kv_keys (key, kind, expires_at) VALUES (?1, ?2, NULL)",
            params![key, kind.as_str()],
        )?;
    }
    Ok(())
}

/// Drop `key` and its value whatever its type.
fn remove(conn: &Connection, key: &str) -> std::result::Result<bool, KvError> {
    let live = live_kind(conn, key)?.is_some();
    if live {
        conn.execute("DELETE FROM kv_keys WHERE key = ?1", [key])?;
    }
    Ok(live)
}

fn set_expiry(
    conn: &Connection,
    key: &str,
    ttl: Option<Duration>,
) -> std::result::Result<(), KvError> {
    conn.execute(
        "UPDATE kv_keys SET expires_at = ?2 WHERE key = ?1",
        params![key, ttl.map(deadline)],
    )?;
    Ok(())
}

fn write_hash(
    conn: &Connection,
    key: &str,
    fields: &FieldMap,
) -> std::result::Result<(), KvError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO kv_hash (key, field, value) VALUES (?1, ?2, ?3)
         ON CONFLICT (key, field) DO UPDATE SET value = excluded.value",
    )?;
    for (field, value) in fields {
        stmt.execute(params![key, field, &value[..]])?;
    }
    Ok(())
}

fn write_string(conn: &Connection, key: &str, value: &[u8]) -> std::result::Result<(), KvError> {
    conn.execute(
        "INSERT INTO kv_string (key, value) VALUES (?1, ?2)
         ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn read_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScoredMember> {
    Ok(ScoredMember {
        member: row.get(0)?,
        score: row.get(1)?,
    })
}

fn zset_len(conn: &Connection, key: &str) -> std::result::Result<i64, KvError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM kv_zset WHERE key = ?1",
        [key],
        |row| row.get(0),
    )?)
}

/// Translate Redis-style inclusive ranks (negative from the end) into an
/// `(offset, count)` pair over a set of `len` entries.
fn rank_window(len: i64, start: i64, stop: i64) -> Option<(i64, i64)> {
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    (start <= stop && start < len).then(|| (start, stop - start + 1))
}

impl KvConnection {
    // -- keys ---------------------------------------------------------------

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.run(move |conn| Ok(live_kind(conn, &key)?.is_some()))
            .await
    }

    /// Delete `keys`, returning how many existed.
    pub async fn del(&self, keys: &[String]) -> Result<usize> {
        let keys = keys.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut removed = 0;
            for key in &keys {
                if remove(&tx, key)? {
                    removed += 1;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    /// Live keys starting with `prefix`, in key order.
    pub async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.to_string();
        self.run(move |conn| {
            let candidates: Vec<String> = {
                let mut stmt = conn.prepare(
                    "SELECT key FROM kv_keys
                     WHERE substr(key, 1, length(?1)) = ?1
                     ORDER BY key",
                )?;
                let rows = stmt.query_map([&prefix], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            let mut live = Vec::with_capacity(candidates.len());
            for key in candidates {
                if live_kind(conn, &key)?.is_some() {
                    live.push(key);
                }
            }
            Ok(live)
        })
        .await
    }

    /// Set a time to live on an existing key. Returns `false` if the key is
    /// missing.
    pub async fn pexpire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let key = key.to_string();
        self.run(move |conn| {
            if live_kind(conn, &key)?.is_none() {
                return Ok(false);
            }
            set_expiry(conn, &key, Some(ttl))?;
            Ok(true)
        })
        .await
    }

    pub async fn pttl(&self, key: &str) -> Result<KeyTtl> {
        let key = key.to_string();
        self.run(move |conn| {
            if live_kind(conn, &key)?.is_none() {
                return Ok(KeyTtl::Missing);
            }
            let at: Option<i64> = conn.query_row(
                "SELECT expires_at FROM kv_keys WHERE key = ?1",
                [&key],
                |row| row.get(0),
            )?;
            Ok(match at {
                None => KeyTtl::Persistent,
                Some(at) => {
                    let left = u64::try_from(at - now_ms()).unwrap_or(0);
                    KeyTtl::Expires(Duration::from_millis(left))
                }
            })
        })
        .await
    }

    // -- hashes -------------------------------------------------------------

    /// Replace the hash at `key` with `fields` and set its expiry in one step.
    pub async fn hset_ex(&self, key: &str, fields: FieldMap, ttl: Option<Duration>) -> Result<()> {
        let key = key.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            remove(&tx, &key)?;
            claim(&tx, &key, Kind::Hash)?;
            write_hash(&tx, &key, &fields)?;
            set_expiry(&tx, &key, ttl)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// All fields of the hash at `key`; empty if the key is missing.
    pub async fn hgetall(&self, key: &str) -> Result<FieldMap> {
        let key = key.to_string();
        self.run(move |conn| {
            let mut fields = FieldMap::new();
            if !check_kind(conn, &key, Kind::Hash)? {
                return Ok(fields);
            }
            let mut stmt =
                conn.prepare_cached("SELECT field, value FROM kv_hash WHERE key = ?1")?;
            let rows = stmt.query_map([&key], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            for row in rows {
                let (field, value) = row?;
                fields.insert(field, Bytes::from(value));
            }
            Ok(fields)
        })
        .await
    }

    // -- strings ------------------------------------------------------------

    /// Store a raw value, clearing any expiry.
    pub async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.set_ex(key, value, None).await
    }

    /// Store a raw value with an optional time to live.
    pub async fn set_ex(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let key = key.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            claim(&tx, &key, Kind::String)?;
            write_string(&tx, &key, &value)?;
            set_expiry(&tx, &key, ttl)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let key = key.to_string();
        self.run(move |conn| {
            if !check_kind(conn, &key, Kind::String)? {
                return Ok(None);
            }
            let value: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT value FROM kv_string WHERE key = ?1",
                    [&key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.map(Bytes::from))
        })
        .await
    }

    // -- sorted sets --------------------------------------------------------

    /// Add or re-score `member`. Returns `true` if it was not present before.
    pub async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool> {
        let key = key.to_string();
        let member = member.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            claim(&tx, &key, Kind::ZSet)?;
            let existed = tx
                .query_row(
                    "SELECT 1 FROM kv_zset WHERE key = ?1 AND member = ?2",
                    params![key, member],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            tx.execute(
                "INSERT INTO kv_zset (key, member, score) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key, member) DO UPDATE SET score = excluded.score",
                params![key, member, score],
            )?;
            tx.commit()?;
            Ok(!existed)
        })
        .await
    }

    /// Remove `member`; the set itself goes away with its last member.
    pub async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let key = key.to_string();
        let member = member.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if !check_kind(&tx, &key, Kind::ZSet)? {
                return Ok(false);
            }
            let removed = tx.execute(
                "DELETE FROM kv_zset WHERE key = ?1 AND member = ?2",
                params![key, member],
            )? > 0;
            if zset_len(&tx, &key)? == 0 {
                tx.execute("DELETE FROM kv_keys WHERE key = ?1", [&key])?;
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    pub async fn zcard(&self, key: &str) -> Result<usize> {
        let key = key.to_string();
        self.run(move |conn| {
            if !check_kind(conn, &key, Kind::ZSet)? {
                return Ok(0);
            }
            Ok(usize::try_from(zset_len(conn, &key)?).unwrap_or(0))
        })
        .await
    }

    /// Entries by inclusive rank, lowest score first. Negative ranks count
    /// from the end, so `zrange(key, 0, -1)` returns the whole set.
    pub async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<ScoredMember>> {
        let key = key.to_string();
        self.run(move |conn| {
            if !check_kind(conn, &key, Kind::ZSet)? {
                return Ok(Vec::new());
            }
            let Some((offset, count)) = rank_window(zset_len(conn, &key)?, start, stop) else {
                return Ok(Vec::new());
            };
            let mut stmt = conn.prepare_cached(
                "SELECT member, score FROM kv_zset WHERE key = ?1
                 ORDER BY score, member LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![key, count, offset], read_member)?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
        .await
    }

    /// Entries with scores between `min` and `max`, lowest first, skipping
    /// `offset` matches and returning at most `limit`.
    pub async fn zrange_by_score(
        &self,
        key: &str,
        min: Bound<f64>,
        max: Bound<f64>,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredMember>> {
        let key = key.to_string();
        self.run(move |conn| {
            if !check_kind(conn, &key, Kind::ZSet)? {
                return Ok(Vec::new());
            }
            let mut sql = String::from("SELECT member, score FROM kv_zset WHERE key = ?1");
            let mut bounds = Vec::with_capacity(2);
            for (bound, inclusive, exclusive) in [(min, ">=", ">"), (max, "<=", "<")] {
                let (op, value) = match bound {
                    Bound::Included(v) => (inclusive, v),
                    Bound::Excluded(v) => (exclusive, v),
                    Bound::Unbounded => continue,
                };
                bounds.push(value);
                sql.push_str(&format!(" AND score {op} ?{}", bounds.len() + 1));
            }
            sql.push_str(" ORDER BY score, member LIMIT ? OFFSET ?");

            let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
            let offset = i64::try_from(offset).unwrap_or(i64::MAX);
            let mut values: Vec<&dyn rusqlite::ToSql> = vec![&key as &dyn rusqlite::ToSql];
            values.extend(bounds.iter().map(|b| b as &dyn rusqlite::ToSql));
            values.push(&limit);
            values.push(&offset);

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(values.as_slice(), read_member)?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
        .await
    }

    /// The entry with the greatest score at or below `score`.
    pub async fn zfloor(&self, key: &str, score: f64) -> Result<Option<ScoredMember>> {
        self.zneighbour(
            key,
            score,
            "SELECT member, score FROM kv_zset WHERE key = ?1 AND score <= ?2
             ORDER BY score DESC, member DESC LIMIT 1",
        )
        .await
    }

    /// The entry with the smallest score at or above `score`.
    pub async fn zceil(&self, key: &str, score: f64) -> Result<Option<ScoredMember>> {
        self.zneighbour(
            key,
            score,
            "SELECT member, score FROM kv_zset WHERE key = ?1 AND score >= ?2
             ORDER BY score, member LIMIT 1",
        )
        .await
    }

    async fn zneighbour(
        &self,
        key: &str,
        score: f64,
        sql: &'static str,
    ) -> Result<Option<ScoredMember>> {
        let key = key.to_string();
        self.run(move |conn| {
            if !check_kind(conn, &key, Kind::ZSet)? {
                return Ok(None);
            }
            Ok(conn
                .query_row(sql, params![key, score], read_member)
                .optional()?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvManager;
    use crate::pool::ManageConnection;
    use fv_core::Error;

    async fn connection() -> (tempfile::TempDir, KvConnection) {
        let dir = tempfile::tempdir().unwrap();
        let manager = KvManager::new(dir.path().join("kv.db"), Duration::from_secs(1));
        let conn = manager.connect().await.unwrap();
        (dir, conn)
    }

    fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Bytes::copy_from_slice(v.as_bytes())))
            .collect()
    }

    fn members(entries: &[ScoredMember]) -> Vec<&str> {
        entries.iter().map(|e| e.member.as_str()).collect()
    }

    #[test]
    fn rank_windows() {
        assert_eq!(rank_window(5, 0, -1), Some((0, 5)));
        assert_eq!(rank_window(5, 1, 2), Some((1, 2)));
        assert_eq!(rank_window(5, -2, -1), Some((3, 2)));
        assert_eq!(rank_window(5, 3, 100), Some((3, 2)));
        assert_eq!(rank_window(5, -100, 0), Some((0, 1)));
        assert_eq!(rank_window(5, 5, 10), None);
        assert_eq!(rank_window(5, 3, 1), None);
        assert_eq!(rank_window(0, 0, -1), None);
    }

    #[tokio::test]
    async fn hashes_are_replaced_whole() {
        let (_dir, conn) = connection().await;
        conn.hset_ex("h", fields(&[("a", "1"), ("b", "2")]), None).await.unwrap();
        assert_eq!(conn.hgetall("h").await.unwrap(), fields(&[("a", "1"), ("b", "2")]));

        conn.hset_ex("h", fields(&[("c", "4")]), None).await.unwrap();
        assert_eq!(conn.hgetall("h").await.unwrap(), fields(&[("c", "4")]));
        assert!(conn.hgetall("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn strings_keep_raw_bytes() {
        let (_dir, conn) = connection().await;
        let payload = Bytes::from_static(&[0, 159, 146, 150, 255]);
        conn.set("s", payload.clone()).await.unwrap();
        assert_eq!(conn.get("s").await.unwrap(), Some(payload));
        assert_eq!(conn.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn wrong_type_is_an_error() {
        let (_dir, conn) = connection().await;
        conn.set("s", Bytes::from_static(b"x")).await.unwrap();
        let err = conn.hgetall("s").await.unwrap_err();
        assert!(matches!(err, Error::Store { .. }));
        assert!(err.to_string().contains("WRONGTYPE"));
        let err = conn.zadd("s", 1.0, "m").await.unwrap_err();
        assert!(matches!(err, Error::Store { .. }));
        assert!(err.to_string().contains("WRONGTYPE"));
    }

    #[tokio::test]
    async fn expired_keys_vanish() {
        let (_dir, conn) = connection().await;
        conn.set_ex("s", Bytes::from_static(b"x"), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(matches!(conn.pttl("s").await.unwrap(), KeyTtl::Expires(_)));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!conn.exists("s").await.unwrap());
        assert_eq!(conn.get("s").await.unwrap(), None);
        assert_eq!(conn.pttl("s").await.unwrap(), KeyTtl::Missing);

        // An expired key can be reused with another type.
        conn.hset_ex("s", fields(&[("a", "1")]), None).await.unwrap();
        assert_eq!(conn.pttl("s").await.unwrap(), KeyTtl::Persistent);
    }

    #[tokio::test]
    async fn pexpire_requires_a_live_key() {
        let (_dir, conn) = connection().await;
        assert!(!conn.pexpire("h", Duration::from_secs(5)).await.unwrap());
        conn.hset_ex("h", fields(&[("a", "1")]), None).await.unwrap();
        assert!(conn.pexpire("h", Duration::from_secs(5)).await.unwrap());
        match conn.pttl("h").await.unwrap() {
            KeyTtl::Expires(left) => assert!(left <= Duration::from_secs(5)),
            other => panic!("unexpected ttl {other:?}"),
        }
    }

    #[tokio::test]
    async fn del_counts_existing_keys() {
        let (_dir, conn) = connection().await;
        conn.set("a", Bytes::from_static(b"1")).await.unwrap();
        conn.zadd("z", 1.0, "m").await.unwrap();
        let removed = conn
            .del(&["a".into(), "z".into(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(conn.zcard("z").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sorted_set_ordering_and_replacement() {
        let (_dir, conn) = connection().await;
        assert!(conn.zadd("z", 30.0, "c").await.unwrap());
        assert!(conn.zadd("z", 10.0, "a").await.unwrap());
        assert!(conn.zadd("z", 20.0, "b").await.unwrap());
        assert!(!conn.zadd("z", 25.0, "b").await.unwrap());

        assert_eq!(conn.zcard("z").await.unwrap(), 3);
        let all = conn.zrange("z", 0, -1).await.unwrap();
        assert_eq!(members(&all), ["a", "b", "c"]);
        assert_eq!(all[1].score, 25.0);
        assert_eq!(members(&conn.zrange("z", -1, -1).await.unwrap()), ["c"]);
    }

    #[tokio::test]
    async fn score_ranges_and_neighbours() {
        let (_dir, conn) = connection().await;
        for (score, member) in [(10.0, "a"), (20.0, "b"), (30.0, "c"), (40.0, "d")] {
            conn.zadd("z", score, member).await.unwrap();
        }

        let closed = conn
            .zrange_by_score("z", Bound::Included(20.0), Bound::Included(30.0), 0, None)
            .await
            .unwrap();
        assert_eq!(members(&closed), ["b", "c"]);

        let half_open = conn
            .zrange_by_score("z", Bound::Included(20.0), Bound::Excluded(40.0), 0, None)
            .await
            .unwrap();
        assert_eq!(members(&half_open), ["b", "c"]);

        let paged = conn
            .zrange_by_score("z", Bound::Unbounded, Bound::Unbounded, 1, Some(2))
            .await
            .unwrap();
        assert_eq!(members(&paged), ["b", "c"]);

        assert_eq!(conn.zfloor("z", 25.0).await.unwrap().unwrap().member, "b");
        assert_eq!(conn.zceil("z", 25.0).await.unwrap().unwrap().member, "c");
        assert_eq!(conn.zfloor("z", 20.0).await.unwrap().unwrap().member, "b");
        assert!(conn.zfloor("z", 5.0).await.unwrap().is_none());
        assert!(conn.zceil("z", 50.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zrem_drops_empty_sets() {
        let (_dir, conn) = connection().await;
        conn.zadd("z", 1.0, "only").await.unwrap();
        assert!(conn.zrem("z", "only").await.unwrap());
        assert!(!conn.zrem("z", "only").await.unwrap());
        assert!(!conn.exists("z").await.unwrap());
    }

    #[tokio::test]
    async fn scan_prefix_lists_live_keys() {
        let (_dir, conn) = connection().await;
        for key in ["p:1", "p:2", "q:1"] {
            conn.set(key, Bytes::from_static(b"x")).await.unwrap();
        }
        assert_eq!(conn.scan_prefix("p:").await.unwrap(), ["p:1", "p:2"]);
    }

    #[tokio::test]
    async fn closed_connection_fails_fast() {
        let (_dir, conn) = connection().await;
        conn.shutdown().await.unwrap();
        conn.shutdown().await.unwrap();
        let err = conn.get("k").await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }
}
