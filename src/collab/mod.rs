//! Non-core collaborators of the concurrency primitives.
//!
//! These are the simple data structures the pipeline building blocks are
//! typically combined with: a growable bitset, a bloom filter built on it,
//! and a sharded cache that puts the [`ReaderWriterLock`] to work per shard.
//! None of them participate in the buffer/pool synchronization protocol.
//!
//! [`ReaderWriterLock`]: crate::rwlock::ReaderWriterLock

pub mod bitset;
pub mod bloom;
pub mod cache;

pub use bitset::DynamicBitSet;
pub use bloom::BloomFilter;
pub use cache::ShardedCache;
