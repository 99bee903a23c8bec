//! Ephemeral coordination state (§3 KV schema).
//!
//! The specification treats the KV store as an external, implementation-free
//! collaborator providing atomic scripts. This crate realizes it as a small
//! SQLite-backed store: every operation executes inside a `BEGIN IMMEDIATE`
//! transaction, which gives the same read-modify-write atomicity an external
//! KV script would, without introducing a second storage dependency.

mod mutex;
mod simhash_store;
mod tokens;
mod window;

pub use mutex::MutexError;
pub use tokens::TokenBucketState;

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type KvResult<T> = Result<T, KvError>;

/// SQLite-backed ephemeral KV store keyed by the families in §3: `seen`,
/// `lock`, `tokens`, `window`, `simhash`, `lsh`.
pub struct KvStore {
    conn: Mutex<Connection>,
}

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_seen (
    url_hash TEXT PRIMARY KEY,
    seen_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kv_locks (
    resource TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kv_tokens (
    domain TEXT PRIMARY KEY,
    tokens REAL NOT NULL,
    last_refill_millis INTEGER NOT NULL,
    capacity REAL NOT NULL,
    refill_per_sec REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS kv_windows (
    domain TEXT NOT NULL,
    request_epoch_millis INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_kv_windows_domain ON kv_windows(domain);

CREATE TABLE IF NOT EXISTS kv_simhash (
    url_hash TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    fingerprint INTEGER NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kv_lsh (
    band INTEGER NOT NULL,
    segment INTEGER NOT NULL,
    url_hash TEXT NOT NULL,
    UNIQUE(band, segment, url_hash)
);
CREATE INDEX IF NOT EXISTS idx_kv_lsh_band_segment ON kv_lsh(band, segment);
"#;

impl KvStore {
    pub fn new(conn: Connection) -> KvResult<Self> {
        conn.execute_batch(KV_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> KvResult<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// `seen:<url-hash>` — authoritative membership bit, TTL 30 days.
    pub fn mark_seen(&self, url_hash: &str, now: chrono::DateTime<chrono::Utc>) -> KvResult<()> {
        let expires_at = now + chrono::Duration::days(30);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv_seen (url_hash, seen_at, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(url_hash) DO UPDATE SET seen_at = excluded.seen_at, expires_at = excluded.expires_at",
            params![url_hash, now.to_rfc3339(), expires_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn is_seen(&self, url_hash: &str, now: chrono::DateTime<chrono::Utc>) -> KvResult<bool> {
        let conn = self.conn.lock().unwrap();
        let expires_at: Option<String> = conn
            .query_row(
                "SELECT expires_at FROM kv_seen WHERE url_hash = ?1",
                params![url_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match expires_at {
            Some(raw) => chrono::DateTime::parse_from_rfc3339(&raw)
                .map(|ts| ts.with_timezone(&chrono::Utc) > now)
                .unwrap_or(false),
            None => false,
        })
    }
}

impl KvStore {
    /// Clears token-bucket, sliding-window, and lock state for a domain, for
    /// the admin surface's reset-domain-rate-limit operation (§6).
    pub fn reset_domain(&self, domain: &str) -> KvResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv_tokens WHERE domain = ?1", params![domain])?;
        conn.execute("DELETE FROM kv_windows WHERE domain = ?1", params![domain])?;
        conn.execute("DELETE FROM kv_locks WHERE resource = ?1", params![domain])?;
        Ok(())
    }
}

pub(crate) fn connection(store: &KvStore) -> std::sync::MutexGuard<'_, Connection> {
    store.conn.lock().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_seen_roundtrip() {
        let kv = KvStore::open_in_memory().unwrap();
        let now = Utc::now();
        assert!(!kv.is_seen("abc", now).unwrap());
        kv.mark_seen("abc", now).unwrap();
        assert!(kv.is_seen("abc", now).unwrap());
    }

    #[test]
    fn test_seen_expires() {
        let kv = KvStore::open_in_memory().unwrap();
        let now = Utc::now();
        kv.mark_seen("abc", now).unwrap();
        let later = now + chrono::Duration::days(31);
        assert!(!kv.is_seen("abc", later).unwrap());
    }
}
