//! Embedded schema for the key-value engine.
//!
//! Every key has one row in `kv_keys` recording its type and optional expiry;
//! the value rows cascade with it. The schema is idempotent and applied by
//! every new connection.

use std::time::Duration;

use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_keys (
    key        TEXT PRIMARY KEY,
    kind       TEXT NOT NULL,
    expires_at INTEGER
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_kv_keys_expiry
    ON kv_keys (expires_at) WHERE expires_at IS NOT NULL;

CREATE TABLE IF NOT EXISTS kv_hash (
    key   TEXT NOT NULL REFERENCES kv_keys(key) ON DELETE CASCADE,
    field TEXT NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (key, field)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS kv_string (
    key   TEXT PRIMARY KEY REFERENCES kv_keys(key) ON DELETE CASCADE,
    value BLOB NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS kv_zset (
    key    TEXT NOT NULL REFERENCES kv_keys(key) ON DELETE CASCADE,
    member TEXT NOT NULL,
    score  REAL NOT NULL,
    PRIMARY KEY (key, member)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_kv_zset_score ON kv_zset (key, score, member);
"#;

/// Apply connection settings and make sure the schema exists.
///
/// The busy timeout goes first so that the schema statements already wait
/// for a competing writer instead of failing.
pub(crate) fn prepare(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.execute_batch(SCHEMA)
}
