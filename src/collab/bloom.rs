//! Bloom filter built on [`DynamicBitSet`].
//!
//! Probabilistic membership with no removal: `check` never reports a false
//! negative, and reports a false positive with roughly the configured
//! probability. Sizing follows the standard formulas
//! `m = -(n ln p) / (ln 2)^2` and `k = (m / n) ln 2` for `n` expected items
//! at false-positive rate `p`. Every hash function in the family must agree
//! for `check` to report membership.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::collab::bitset::DynamicBitSet;
use crate::error::ConfigError;

/// A bloom filter over a seeded family of hash functions.
#[derive(Debug)]
pub struct BloomFilter {
    bits: DynamicBitSet,
    /// Size of the bit array (m).
    bit_count: usize,
    /// Number of hash functions (k).
    hash_count: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` at `false_positive_rate`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `expected_items` is zero or the rate is
    /// not strictly between 0 and 1.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Result<Self, ConfigError> {
        if expected_items == 0 {
            return Err(ConfigError::InvalidExpectedItems);
        }
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(ConfigError::InvalidFalsePositiveRate(false_positive_rate));
        }

        let n = expected_items as f64;
        let ln2 = std::f64::consts::LN_2;
        let bit_count = (-(n * false_positive_rate.ln()) / (ln2 * ln2)).ceil() as usize;
        let bit_count = bit_count.max(1);
        let hash_count = ((bit_count as f64 / n) * ln2).round().max(1.0) as u32;

        Ok(Self {
            bits: DynamicBitSet::with_capacity(bit_count),
            bit_count,
            hash_count,
        })
    }

    /// Records an item as a member.
    pub fn set<T: Hash + ?Sized>(&mut self, item: &T) {
        for seed in 0..self.hash_count {
            let position = self.position(item, seed);
            self.bits.set(position);
        }
    }

    /// Tests membership: `false` means definitely absent, `true` means
    /// present with the configured false-positive probability.
    pub fn check<T: Hash + ?Sized>(&self, item: &T) -> bool {
        (0..self.hash_count).all(|seed| self.bits.check(self.position(item, seed)))
    }

    /// Returns the size of the underlying bit array.
    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    /// Returns the number of hash functions in the family.
    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    fn position<T: Hash + ?Sized>(&self, item: &T, seed: u32) -> usize {
        let mut hasher = DefaultHasher::new();
        seed.hash(&mut hasher);
        item.hash(&mut hasher);
        (hasher.finish() % self.bit_count as u64) as usize
    }
}
