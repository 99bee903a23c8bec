//! Sliding-window primitive backing the Rate controller (§4.3).

use super::{connection, KvResult, KvStore};
use rusqlite::params;

impl KvStore {
    /// Atomically evicts timestamps older than `now - window_seconds` and, if
    /// the remaining cardinality is below `max_requests`, records `now` and
    /// allows the request.
    pub fn sliding_window_allow(
        &self,
        domain: &str,
        window_seconds: i64,
        max_requests: u32,
        now_millis: i64,
    ) -> KvResult<bool> {
        let conn = connection(self);
        conn.execute("BEGIN IMMEDIATE", [])?;

        let cutoff = now_millis - window_seconds * 1000;
        conn.execute(
            "DELETE FROM kv_windows WHERE domain = ?1 AND request_epoch_millis < ?2",
            params![domain, cutoff],
        )?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM kv_windows WHERE domain = ?1",
            params![domain],
            |row| row.get(0),
        )?;

        let allowed = (count as u32) < max_requests;
        if allowed {
            conn.execute(
                "INSERT INTO kv_windows (domain, request_epoch_millis) VALUES (?1, ?2)",
                params![domain, now_millis],
            )?;
        }
        conn.execute("COMMIT", [])?;

        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sliding_window_caps_requests() {
        let kv = KvStore::open_in_memory().unwrap();
        assert!(kv.sliding_window_allow("a.com", 60, 2, 0).unwrap());
        assert!(kv.sliding_window_allow("a.com", 60, 2, 100).unwrap());
        assert!(!kv.sliding_window_allow("a.com", 60, 2, 200).unwrap());
    }

    #[test]
    fn test_sliding_window_evicts_old_entries() {
        let kv = KvStore::open_in_memory().unwrap();
        assert!(kv.sliding_window_allow("a.com", 1, 1, 0).unwrap());
        assert!(!kv.sliding_window_allow("a.com", 1, 1, 500).unwrap());
        // past the 1s window, the first entry is evicted
        assert!(kv.sliding_window_allow("a.com", 1, 1, 1100).unwrap());
    }
}
