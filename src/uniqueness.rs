//! Uniqueness Filter: a rotating Bloom filter over
//! normalized query hashes.

use crate::hash::{self, NormalizeConfig};
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, AtomicU8, Ordering},
    sync::Mutex,
};
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Operating mode for the uniqueness filter.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    /// Provisions 4x the bits a target false-positive rate would need,
    /// pushing the effective false-positive rate to roughly 1e-6.
    Strict,
    /// Sized directly for the configured false-positive rate.
    Probabilistic {
        /// Target false-positive rate, e.g. `1e-4`.
        false_positive_rate: f64,
    },
    /// No filtering: every query is reported unique, no state kept.
    None,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Probabilistic {
            false_positive_rate: 1e-4,
        }
    }
}

/// Configuration for the uniqueness tracker.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct UniquenessConfig {
    /// Operating mode.
    pub mode: Mode,
    /// Expected number of unique items the current cell should hold.
    pub expected_items: u64,
    /// Memory cap per Bloom cell, in bytes. Sizing clamps `m` to this cap.
    pub memory_cap_bytes: u64,
    /// Number of inserts after which the current cell rotates into the
    /// archive and a fresh cell is created.
    pub rotation_interval: u64,
    /// Maximum number of archived cells kept for lookups.
    pub archive_capacity: usize,
    /// Normalization applied before hashing.
    pub normalize: NormalizeConfig,
}

impl Default for UniquenessConfig {
    fn default() -> Self {
        UniquenessConfig {
            mode: Mode::default(),
            expected_items: 1_000_000,
            memory_cap_bytes: 256 * 1024 * 1024,
            rotation_interval: 100_000_000,
            archive_capacity: 10,
            normalize: NormalizeConfig::default(),
        }
    }
}

/// One Bloom filter bit array plus its sizing parameters.
struct BloomCell {
    bits: Vec<AtomicU8>,
    bit_len: u64,
    hash_positions: u32,
    inserted: AtomicU64,
}

impl BloomCell {
    fn new(expected_items: u64, false_positive_rate: f64, memory_cap_bytes: u64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(1e-9, 0.5);
        let ideal_bits = (-n * p.ln() / (std::f64::consts::LN_2.powi(2))).ceil();
        let cap_bits = (memory_cap_bytes.max(1) * 8) as f64;
        let bit_len = ideal_bits.min(cap_bits).max(64.0) as u64;
        let k = ((bit_len as f64 / n) * std::f64::consts::LN_2).floor().max(1.0) as u32;
        let byte_len = ((bit_len + 7) / 8) as usize;
        let bits = (0..byte_len).map(|_| AtomicU8::new(0)).collect();
        BloomCell {
            bits,
            bit_len,
            hash_positions: k,
            inserted: AtomicU64::new(0),
        }
    }

    fn positions(&self, fingerprint: &[u8; 32]) -> Vec<u64> {
        let h1 = xxh3_64_with_seed(fingerprint, 0);
        let h2 = xxh3_64_with_seed(fingerprint, 1).max(1);
        (0..self.hash_positions as u64)
            .map(|i| (h1.wrapping_add(i.wrapping_mul(h2))) % self.bit_len)
            .collect()
    }

    fn contains(&self, fingerprint: &[u8; 32]) -> bool {
        self.positions(fingerprint).into_iter().all(|bit| self.get_bit(bit))
    }

    fn insert(&self, fingerprint: &[u8; 32]) {
        for bit in self.positions(fingerprint) {
            self.set_bit(bit);
        }
        self.inserted.fetch_add(1, Ordering::Relaxed);
    }

    fn get_bit(&self, bit: u64) -> bool {
        let byte = (bit / 8) as usize;
        let mask = 1u8 << (bit % 8);
        self.bits[byte].load(Ordering::Relaxed) & mask != 0
    }

    fn set_bit(&self, bit: u64) {
        let byte = (bit / 8) as usize;
        let mask = 1u8 << (bit % 8);
        self.bits[byte].fetch_or(mask, Ordering::Relaxed);
    }

    fn estimated_fill_ratio(&self) -> f64 {
        let sample = self.bit_len.min(10_000);
        let set = (0..sample).filter(|&bit| self.get_bit(bit)).count();
        set as f64 / sample as f64
    }
}

/// A rotating Bloom-filter based uniqueness tracker.
///
/// Consults the archive first, then the current cell, for lookups; inserts
/// always land in the current cell. When the current cell's insert count
/// reaches `rotation_interval` it moves to the archive (a bounded FIFO) and
/// a fresh cell replaces it.
pub struct UniquenessTracker {
    config: UniquenessConfig,
    current: Mutex<BloomCell>,
    archive: Mutex<VecDeque<BloomCell>>,
    total: AtomicU64,
    unique: AtomicU64,
    duplicate: AtomicU64,
}

impl UniquenessTracker {
    /// Builds a tracker from `config`. The effective false-positive rate and
    /// bit-array size are derived from the standard Bloom filter sizing
    /// formula; `Strict` mode provisions 4x the bits a `1e-6` target would
    /// need.
    pub fn new(config: UniquenessConfig) -> Self {
        let false_positive_rate = match config.mode {
            Mode::Strict => 1e-6 / 4.0,
            Mode::Probabilistic { false_positive_rate } => false_positive_rate,
            Mode::None => 1.0,
        };
        let cell = BloomCell::new(config.expected_items, false_positive_rate, config.memory_cap_bytes);
        UniquenessTracker {
            config,
            current: Mutex::new(cell),
            archive: Mutex::new(VecDeque::with_capacity(10)),
            total: AtomicU64::new(0),
            unique: AtomicU64::new(0),
            duplicate: AtomicU64::new(0),
        }
    }

    /// Returns true iff the normalized query was probably not seen before,
    /// and records it as seen either way (except in `Mode::None`).
    pub fn check_and_add(&self, query: &str) -> bool {
        self.total.fetch_add(1, Ordering::Relaxed);
        if self.config.mode == Mode::None {
            self.unique.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        let fingerprint = hash::hash_query(query, &self.config.normalize);
        let seen_in_archive = self
            .archive
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|cell| cell.contains(&fingerprint));

        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if seen_in_archive || current.contains(&fingerprint) {
            self.duplicate.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        current.insert(&fingerprint);
        self.unique.fetch_add(1, Ordering::Relaxed);

        if current.inserted.load(Ordering::Relaxed) >= self.config.rotation_interval {
            self.rotate(&mut current);
        }
        true
    }

    /// Reports membership without recording the query as seen.
    pub fn check_only(&self, query: &str) -> bool {
        if self.config.mode == Mode::None {
            return true;
        }
        let fingerprint = hash::hash_query(query, &self.config.normalize);
        let seen_in_archive = self
            .archive
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|cell| cell.contains(&fingerprint));
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        !(seen_in_archive || current.contains(&fingerprint))
    }

    fn rotate(&self, current: &mut BloomCell) {
        let false_positive_rate = match self.config.mode {
            Mode::Strict => 1e-6 / 4.0,
            Mode::Probabilistic { false_positive_rate } => false_positive_rate,
            Mode::None => return,
        };
        let fresh = BloomCell::new(self.config.expected_items, false_positive_rate, self.config.memory_cap_bytes);
        let retired = std::mem::replace(current, fresh);
        let mut archive = self.archive.lock().unwrap_or_else(|e| e.into_inner());
        archive.push_back(retired);
        while archive.len() > self.config.archive_capacity {
            archive.pop_front();
        }
    }

    /// A summary snapshot suitable for checkpoints and monitoring lines.
    pub fn stats(&self) -> UniquenessStats {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        UniquenessStats {
            total: self.total.load(Ordering::Relaxed),
            unique: self.unique.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            estimated_fill_ratio: current.estimated_fill_ratio(),
            archived_cells: self.archive.lock().unwrap_or_else(|e| e.into_inner()).len(),
        }
    }
}

/// A point-in-time snapshot of the tracker's counters.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct UniquenessStats {
    /// Number of `check_and_add` calls so far.
    pub total: u64,
    /// Number that returned `true`.
    pub unique: u64,
    /// Number that returned `false`.
    pub duplicate: u64,
    /// Estimated live false-positive rate, sampled over up to 10 000 bits.
    pub estimated_fill_ratio: f64,
    /// Number of archived (rotated-out) cells currently retained.
    pub archived_cells: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(mode: Mode) -> UniquenessTracker {
        UniquenessTracker::new(UniquenessConfig {
            mode,
            expected_items: 10_000,
            ..UniquenessConfig::default()
        })
    }

    #[test]
    fn monotonicity_holds() {
        let t = tracker(Mode::default());
        for i in 0..100 {
            t.check_and_add(&format!("SELECT {}", i));
        }
        let stats = t.stats();
        assert_eq!(stats.total, 100);
        assert_eq!(stats.unique + stats.duplicate, stats.total);
    }

    #[test]
    fn repeated_query_is_detected_as_duplicate() {
        let t = tracker(Mode::Strict);
        assert!(t.check_and_add("SELECT 1"));
        assert!(!t.check_and_add("SELECT 1"));
    }

    #[test]
    fn no_false_negatives_for_an_inserted_item() {
        let t = tracker(Mode::Strict);
        for i in 0..500 {
            assert!(t.check_and_add(&format!("SELECT {} FROM t", i)));
        }
        for i in 0..500 {
            assert!(!t.check_and_add(&format!("SELECT {} FROM t", i)));
        }
    }

    #[test]
    fn none_mode_always_reports_unique() {
        let t = tracker(Mode::None);
        assert!(t.check_and_add("SELECT 1"));
        assert!(t.check_and_add("SELECT 1"));
    }
}
