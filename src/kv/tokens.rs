//! Token-bucket primitive backing the Rate controller (§4.3).

use super::{connection, KvResult, KvStore};
use rusqlite::{params, OptionalExtension};

/// Snapshot of a domain's token-bucket state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucketState {
    pub tokens: f64,
    pub last_refill_millis: i64,
}

impl KvStore {
    /// Atomically refills and attempts to withdraw one token for `domain`.
    /// Returns `true` if a token was available and withdrawn.
    pub fn token_bucket_allow(
        &self,
        domain: &str,
        capacity: f64,
        refill_per_sec: f64,
        now_millis: i64,
    ) -> KvResult<bool> {
        let conn = connection(self);
        conn.execute("BEGIN IMMEDIATE", [])?;

        let existing: Option<(f64, i64)> = conn
            .query_row(
                "SELECT tokens, last_refill_millis FROM kv_tokens WHERE domain = ?1",
                params![domain],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (mut tokens, last_refill) = existing.unwrap_or((capacity, now_millis));
        let elapsed_secs = ((now_millis - last_refill).max(0) as f64) / 1000.0;
        tokens = (tokens + elapsed_secs * refill_per_sec).min(capacity);

        let allowed = tokens >= 1.0;
        if allowed {
            tokens -= 1.0;
        }

        conn.execute(
            "INSERT INTO kv_tokens (domain, tokens, last_refill_millis, capacity, refill_per_sec)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(domain) DO UPDATE SET
                tokens = excluded.tokens,
                last_refill_millis = excluded.last_refill_millis,
                capacity = excluded.capacity,
                refill_per_sec = excluded.refill_per_sec",
            params![domain, tokens, now_millis, capacity, refill_per_sec],
        )?;
        conn.execute("COMMIT", [])?;

        Ok(allowed)
    }

    pub fn token_bucket_state(&self, domain: &str) -> KvResult<Option<TokenBucketState>> {
        let conn = connection(self);
        let row: Option<(f64, i64)> = conn
            .query_row(
                "SELECT tokens, last_refill_millis FROM kv_tokens WHERE domain = ?1",
                params![domain],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(tokens, last_refill_millis)| TokenBucketState {
            tokens,
            last_refill_millis,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket_allows_up_to_capacity() {
        let kv = KvStore::open_in_memory().unwrap();
        assert!(kv.token_bucket_allow("a.com", 2.0, 1.0, 0).unwrap());
        assert!(kv.token_bucket_allow("a.com", 2.0, 1.0, 0).unwrap());
        assert!(!kv.token_bucket_allow("a.com", 2.0, 1.0, 0).unwrap());
    }

    #[test]
    fn test_token_bucket_refills_over_time() {
        let kv = KvStore::open_in_memory().unwrap();
        assert!(kv.token_bucket_allow("a.com", 1.0, 1.0, 0).unwrap());
        assert!(!kv.token_bucket_allow("a.com", 1.0, 1.0, 100).unwrap());
        // one full second later, one token refilled
        assert!(kv.token_bucket_allow("a.com", 1.0, 1.0, 1000).unwrap());
    }
}
