//! Process-wide Bloom filter layer over the authoritative KV seen-set (§4.4).

use bloomfilter::Bloom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Wraps a `Bloom<String>` sized per the standard capacity/FPR formulae and
/// guarded by a mutex so concurrent fetcher workers can share one instance.
/// The Bloom filter is never authoritative — a `true` from `might_contain`
/// only licenses a KV lookup; `false` is a definite negative.
pub struct BloomLayer {
    inner: Mutex<Bloom<String>>,
    false_positive_rate: f64,
    marked_count: AtomicU64,
}

impl BloomLayer {
    /// `items_count` and `false_positive_rate` follow §3/§4.4: ~10^7 capacity
    /// at ~1% FPR by default.
    pub fn new(items_count: usize, false_positive_rate: f64) -> Self {
        Self {
            inner: Mutex::new(Bloom::new_for_fp_rate(items_count, false_positive_rate)),
            false_positive_rate,
            marked_count: AtomicU64::new(0),
        }
    }

    pub fn might_contain(&self, url_hash: &str) -> bool {
        self.inner.lock().unwrap().check(&url_hash.to_string())
    }

    pub fn mark(&self, url_hash: &str) {
        self.inner.lock().unwrap().set(&url_hash.to_string());
        self.marked_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Approximate number of `mark` calls observed by this instance (not a
    /// true set cardinality estimator — the Bloom filter itself does not
    /// track distinct inserts), for the admin dedup-stats operation (§6).
    pub fn approximate_count(&self) -> u64 {
        self.marked_count.load(Ordering::Relaxed)
    }

    pub fn expected_false_positive_rate(&self) -> f64 {
        self.false_positive_rate
    }
}
