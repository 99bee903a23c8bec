//! 64-bit SimHash content fingerprinting (§4.4).

use std::collections::HashMap;
use std::io::Cursor;

/// Computes a 64-bit SimHash fingerprint of `text`.
///
/// 1. Tokenize into lowercased 5-word shingles after stripping
///    non-alphanumeric characters; shingle frequency is the weight.
/// 2. Hash each shingle to 64 bits (MurmurHash3) and accumulate a signed
///    64-element vector: +weight per set bit, -weight per clear bit.
/// 3. The output bit `i` is 1 iff the accumulator at `i` is positive.
///
/// Deterministic: identical input text always yields an identical fingerprint.
pub fn simhash(text: &str) -> u64 {
    let shingles = shingle_frequencies(text, 5);
    let mut acc = [0i64; 64];

    for (shingle, weight) in shingles {
        let hash = hash_shingle(&shingle);
        for (bit, slot) in acc.iter_mut().enumerate() {
            if (hash >> bit) & 1 == 1 {
                *slot += weight as i64;
            } else {
                *slot -= weight as i64;
            }
        }
    }

    let mut fingerprint: u64 = 0;
    for (bit, value) in acc.iter().enumerate() {
        if *value > 0 {
            fingerprint |= 1 << bit;
        }
    }
    fingerprint
}

/// Hamming distance between two fingerprints; near-duplicates are
/// `hamming_distance(a, b) <= 3` (~95% similarity per §4.4).
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

fn shingle_frequencies(text: &str, shingle_size: usize) -> HashMap<String, u32> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();

    let mut freq = HashMap::new();
    if words.len() < shingle_size {
        if !words.is_empty() {
            *freq.entry(words.join(" ")).or_insert(0) += 1;
        }
        return freq;
    }

    for window in words.windows(shingle_size) {
        let shingle = window.join(" ");
        *freq.entry(shingle).or_insert(0) += 1;
    }
    freq
}

fn hash_shingle(shingle: &str) -> u64 {
    let mut cursor = Cursor::new(shingle.as_bytes());
    let hash = murmur3::murmur3_x64_128(&mut cursor, 0).unwrap_or(0);
    (hash & 0xFFFF_FFFF_FFFF_FFFF) as u64
}
