//! Growable bitset over 64-bit blocks.
//!
//! Unlike the bounded buffer, whose capacity is fixed by design, the bitset
//! grows on demand: setting a bit beyond the current range extends the block
//! vector. Checking a bit never grows anything; positions past the end are
//! simply unset.

const BLOCK_BITS: usize = 64;

/// A dynamic bitset with implicit on-demand growth.
#[derive(Debug, Clone, Default)]
pub struct DynamicBitSet {
    blocks: Vec<u64>,
}

impl DynamicBitSet {
    /// Creates an empty bitset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bitset pre-sized to hold at least `bits` positions.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            blocks: vec![0; bits.div_ceil(BLOCK_BITS)],
        }
    }

    /// Sets the bit at `position`, growing the bitset if needed.
    pub fn set(&mut self, position: usize) {
        let block = position / BLOCK_BITS;
        if block >= self.blocks.len() {
            self.blocks.resize(block + 1, 0);
        }
        self.blocks[block] |= 1 << (position % BLOCK_BITS);
    }

    /// Returns whether the bit at `position` is set.
    ///
    /// Positions beyond the current range are unset; reads never grow.
    pub fn check(&self, position: usize) -> bool {
        let block = position / BLOCK_BITS;
        match self.blocks.get(block) {
            Some(bits) => bits & (1 << (position % BLOCK_BITS)) != 0,
            None => false,
        }
    }

    /// Returns the number of set bits.
    pub fn count_ones(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Returns the number of allocated 64-bit blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_check() {
        let mut bits = DynamicBitSet::new();
        bits.set(0);
        bits.set(63);
        bits.set(64);

        assert!(bits.check(0));
        assert!(bits.check(63));
        assert!(bits.check(64));
        assert!(!bits.check(1));
        assert!(!bits.check(65));
    }

    #[test]
    fn test_set_grows_on_demand() {
        let mut bits = DynamicBitSet::new();
        assert_eq!(bits.block_count(), 0);

        bits.set(1000);
        assert!(bits.check(1000));
        assert_eq!(bits.block_count(), 1000 / 64 + 1);
    }

    #[test]
    fn test_check_beyond_range_does_not_grow() {
        let bits = DynamicBitSet::with_capacity(64);
        assert!(!bits.check(100_000));
        assert_eq!(bits.block_count(), 1);
    }

    #[test]
    fn test_set_is_idempotent() {
        let mut bits = DynamicBitSet::new();
        bits.set(42);
        bits.set(42);
        assert_eq!(bits.count_ones(), 1);
    }
}
