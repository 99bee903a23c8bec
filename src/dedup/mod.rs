//! Deduplication (§4.4): URL seen-set (Bloom + KV) and content-similarity
//! index (SimHash + LSH).

mod bloom;
mod simhash;

pub use bloom::BloomLayer;
pub use simhash::{hamming_distance, simhash};

use crate::kv::KvStore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Near-duplicate threshold (configurable, default 3 per §4.4/§6).
pub const DEFAULT_HAMMING_THRESHOLD: u32 = 3;
pub const DEFAULT_LSH_BANDS: u32 = 4;
pub const DEFAULT_LSH_BAND_BITS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlDedupDecision {
    New,
    Seen,
}

/// Two-layer URL deduplication index: an in-process Bloom filter as a fast
/// "definitely not seen" pre-filter over the authoritative KV seen-set.
pub struct UrlDedupIndex {
    bloom: BloomLayer,
    kv: Arc<KvStore>,
}

impl UrlDedupIndex {
    pub fn new(kv: Arc<KvStore>, capacity: usize, false_positive_rate: f64) -> Self {
        Self {
            bloom: BloomLayer::new(capacity, false_positive_rate),
            kv,
        }
    }

    /// Rebuilds the in-process Bloom filter from the authoritative KV
    /// seen-set on startup (§9 design note: Bloom is an optimization over KV,
    /// never ground truth).
    pub fn rebuild_from_kv(&self, seen_hashes: impl IntoIterator<Item = String>) {
        for hash in seen_hashes {
            self.bloom.mark(&hash);
        }
    }

    /// Checks whether `canonical_url` has been seen. `false`-from-Bloom is a
    /// definite negative; a Bloom hit is verified against KV.
    pub fn check(&self, canonical_url: &str) -> Result<UrlDedupDecision, crate::kv::KvError> {
        let hash = sha256_hex(canonical_url);
        if !self.bloom.might_contain(&hash) {
            return Ok(UrlDedupDecision::New);
        }
        let now = chrono::Utc::now();
        if self.kv.is_seen(&hash, now)? {
            Ok(UrlDedupDecision::Seen)
        } else {
            Ok(UrlDedupDecision::New)
        }
    }

    /// Atomically marks `canonical_url` as seen in both layers.
    pub fn mark_seen(&self, canonical_url: &str) -> Result<(), crate::kv::KvError> {
        let hash = sha256_hex(canonical_url);
        self.kv.mark_seen(&hash, chrono::Utc::now())?;
        self.bloom.mark(&hash);
        Ok(())
    }

    /// Bloom-layer stats for the admin surface's dedup-stats operation (§6).
    pub fn bloom_stats(&self) -> (u64, f64) {
        (
            self.bloom.approximate_count(),
            self.bloom.expected_false_positive_rate(),
        )
    }
}

/// Content-similarity index backed by SimHash fingerprints and an LSH bucket
/// index over their bands.
pub struct ContentDedupIndex {
    kv: Arc<KvStore>,
    hamming_threshold: u32,
    bands: u32,
    band_bits: u32,
}

impl ContentDedupIndex {
    pub fn new(kv: Arc<KvStore>, hamming_threshold: u32, bands: u32, band_bits: u32) -> Self {
        Self {
            kv,
            hamming_threshold,
            bands,
            band_bits,
        }
    }

    /// Returns the URL of a near-duplicate already indexed, if any, and
    /// always inserts `fingerprint` into the index so later pages can be
    /// compared against this one.
    pub fn check_and_insert(
        &self,
        url_hash: &str,
        url: &str,
        text: &str,
    ) -> Result<Option<String>, crate::kv::KvError> {
        let fingerprint = simhash(text);
        let candidates = self.kv.lsh_candidates(fingerprint, self.bands, self.band_bits)?;

        let mut duplicate_of = None;
        for candidate_hash in &candidates {
            if candidate_hash == url_hash {
                continue;
            }
            if let Some(candidate_fp) = self.kv.get_simhash(candidate_hash)? {
                if hamming_distance(fingerprint, candidate_fp) <= self.hamming_threshold {
                    duplicate_of = self.kv.get_url_for_hash(candidate_hash)?;
                    break;
                }
            }
        }

        self.kv
            .store_simhash(url_hash, url, fingerprint, chrono::Utc::now())?;
        self.kv
            .lsh_insert(url_hash, fingerprint, self.bands, self.band_bits)?;

        Ok(duplicate_of)
    }
}

pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}
