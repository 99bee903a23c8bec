//! Distributed mutex primitive backing the Rate controller (§4.3).

use super::{connection, KvResult, KvStore};
use rand::Rng;
use rusqlite::{params, OptionalExtension};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MutexError {
    #[error("resource is held by another owner")]
    Unavailable,
}

impl KvStore {
    /// Set-if-absent acquisition with a TTL. Returns `Ok(())` if `owner` now
    /// holds the lock (either freshly or because it already did and the TTL
    /// was refreshed), `Err(MutexError::Unavailable)` if another live owner
    /// holds it.
    pub fn mutex_acquire(
        &self,
        resource: &str,
        owner: &str,
        ttl_millis: i64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> KvResult<Result<(), MutexError>> {
        let conn = connection(self);
        conn.execute("BEGIN IMMEDIATE", [])?;

        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT owner, expires_at FROM kv_locks WHERE resource = ?1",
                params![resource],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let held_by_other = match &existing {
            Some((existing_owner, expires_at)) => {
                let expired = chrono::DateTime::parse_from_rfc3339(expires_at)
                    .map(|ts| ts.with_timezone(&chrono::Utc) <= now)
                    .unwrap_or(true);
                existing_owner != owner && !expired
            }
            None => false,
        };

        if held_by_other {
            conn.execute("COMMIT", [])?;
            return Ok(Err(MutexError::Unavailable));
        }

        let expires_at = now + chrono::Duration::milliseconds(ttl_millis);
        conn.execute(
            "INSERT INTO kv_locks (resource, owner, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(resource) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at",
            params![resource, owner, expires_at.to_rfc3339()],
        )?;
        conn.execute("COMMIT", [])?;
        Ok(Ok(()))
    }

    /// Compare-and-delete release: only removes the lock if `owner` currently
    /// holds it.
    pub fn mutex_release(&self, resource: &str, owner: &str) -> KvResult<()> {
        let conn = connection(self);
        conn.execute(
            "DELETE FROM kv_locks WHERE resource = ?1 AND owner = ?2",
            params![resource, owner],
        )?;
        Ok(())
    }

    /// Acquires with exponential backoff: start 100ms, factor 2, jitter
    /// ±25%, capped at 10s, checking `deadline` at least every 100ms.
    pub async fn mutex_acquire_with_retry(
        &self,
        resource: &str,
        owner: &str,
        ttl_millis: i64,
        deadline: std::time::Instant,
    ) -> Result<(), MutexError> {
        let mut backoff_ms: u64 = 100;
        loop {
            let now = chrono::Utc::now();
            match self.mutex_acquire(resource, owner, ttl_millis, now) {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(MutexError::Unavailable)) => {}
                Err(_) => return Err(MutexError::Unavailable),
            }

            if std::time::Instant::now() >= deadline {
                return Err(MutexError::Unavailable);
            }

            let jitter = {
                let mut rng = rand::thread_rng();
                rng.gen_range(-0.25..=0.25)
            };
            let jittered = (backoff_ms as f64 * (1.0 + jitter)).max(1.0) as u64;
            let sleep_for = Duration::from_millis(jittered.min(100)).min(
                deadline.saturating_duration_since(std::time::Instant::now()),
            );
            tokio::time::sleep(sleep_for).await;

            backoff_ms = (backoff_ms * 2).min(10_000);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_acquire_and_release() {
        let kv = KvStore::open_in_memory().unwrap();
        let now = Utc::now();
        assert_eq!(kv.mutex_acquire("dom", "w1", 30_000, now).unwrap(), Ok(()));
        assert_eq!(
            kv.mutex_acquire("dom", "w2", 30_000, now).unwrap(),
            Err(MutexError::Unavailable)
        );
        kv.mutex_release("dom", "w1").unwrap();
        assert_eq!(kv.mutex_acquire("dom", "w2", 30_000, now).unwrap(), Ok(()));
    }

    #[test]
    fn test_release_requires_matching_owner() {
        let kv = KvStore::open_in_memory().unwrap();
        let now = Utc::now();
        kv.mutex_acquire("dom", "w1", 30_000, now).unwrap().unwrap();
        kv.mutex_release("dom", "w2").unwrap();
        // w1 still holds it since w2 didn't actually own it
        assert_eq!(
            kv.mutex_acquire("dom", "w2", 30_000, now).unwrap(),
            Err(MutexError::Unavailable)
        );
    }

    #[test]
    fn test_expired_lock_can_be_stolen() {
        let kv = KvStore::open_in_memory().unwrap();
        let now = Utc::now();
        kv.mutex_acquire("dom", "w1", 10, now).unwrap().unwrap();
        let later = now + chrono::Duration::seconds(1);
        assert_eq!(kv.mutex_acquire("dom", "w2", 30_000, later).unwrap(), Ok(()));
    }
}
