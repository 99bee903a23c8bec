//! `simhash:<url-hash>` and `lsh:<band>:<segment>` state (§3, §4.4).

use super::{connection, KvResult, KvStore};
use rusqlite::params;

impl KvStore {
    pub fn store_simhash(
        &self,
        url_hash: &str,
        url: &str,
        fingerprint: u64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> KvResult<()> {
        let expires_at = now + chrono::Duration::days(30);
        let conn = connection(self);
        conn.execute(
            "INSERT INTO kv_simhash (url_hash, url, fingerprint, expires_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url_hash) DO UPDATE SET url = excluded.url, fingerprint = excluded.fingerprint, expires_at = excluded.expires_at",
            params![url_hash, url, fingerprint as i64, expires_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Inserts `url_hash` into all LSH bands for `fingerprint`, splitting the
    /// 64-bit value into `bands` contiguous slices of `band_bits` bits each.
    pub fn lsh_insert(
        &self,
        url_hash: &str,
        fingerprint: u64,
        bands: u32,
        band_bits: u32,
    ) -> KvResult<()> {
        let conn = connection(self);
        for band in 0..bands {
            let segment = band_segment(fingerprint, band, band_bits);
            conn.execute(
                "INSERT OR IGNORE INTO kv_lsh (band, segment, url_hash) VALUES (?1, ?2, ?3)",
                params![band, segment as i64, url_hash],
            )?;
        }
        Ok(())
    }

    /// Returns the union of URL hashes sharing any LSH band segment with
    /// `fingerprint`.
    pub fn lsh_candidates(
        &self,
        fingerprint: u64,
        bands: u32,
        band_bits: u32,
    ) -> KvResult<Vec<String>> {
        let conn = connection(self);
        let mut out = std::collections::HashSet::new();
        for band in 0..bands {
            let segment = band_segment(fingerprint, band, band_bits);
            let mut stmt = conn.prepare(
                "SELECT url_hash FROM kv_lsh WHERE band = ?1 AND segment = ?2",
            )?;
            let rows = stmt.query_map(params![band, segment as i64], |row| row.get::<_, String>(0))?;
            for row in rows {
                out.insert(row?);
            }
        }
        Ok(out.into_iter().collect())
    }

    pub fn get_simhash(&self, url_hash: &str) -> KvResult<Option<u64>> {
        use rusqlite::OptionalExtension;
        let conn = connection(self);
        let value: Option<i64> = conn
            .query_row(
                "SELECT fingerprint FROM kv_simhash WHERE url_hash = ?1",
                params![url_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(|v| v as u64))
    }

    /// Resolves the original URL a content hash was first seen under.
    pub fn get_url_for_hash(&self, url_hash: &str) -> KvResult<Option<String>> {
        use rusqlite::OptionalExtension;
        let conn = connection(self);
        conn.query_row(
            "SELECT url FROM kv_simhash WHERE url_hash = ?1",
            params![url_hash],
            |row| row.get(0),
        )
        .optional()
        .map_err(KvError::from)
    }
}

fn band_segment(fingerprint: u64, band: u32, band_bits: u32) -> u64 {
    let shift = band * band_bits;
    let mask = if band_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << band_bits) - 1
    };
    (fingerprint >> shift) & mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_lsh_insert_and_lookup() {
        let kv = KvStore::open_in_memory().unwrap();
        kv.store_simhash("h1", "https://example.com/a", 0b1010_1010, Utc::now())
            .unwrap();
        kv.lsh_insert("h1", 0b1010_1010, 4, 16).unwrap();

        let candidates = kv.lsh_candidates(0b1010_1010, 4, 16).unwrap();
        assert_eq!(candidates, vec!["h1".to_string()]);
    }

    #[test]
    fn test_lsh_candidates_share_band() {
        let kv = KvStore::open_in_memory().unwrap();
        // differ only in the high band
        let fp1: u64 = 0x0000_0000_0000_00FF;
        let fp2: u64 = 0x1234_0000_0000_00FF;
        kv.lsh_insert("h1", fp1, 4, 16).unwrap();
        kv.lsh_insert("h2", fp2, 4, 16).unwrap();

        let candidates = kv.lsh_candidates(fp1, 4, 16).unwrap();
        assert!(candidates.contains(&"h1".to_string()));
        assert!(candidates.contains(&"h2".to_string()));
    }
}
