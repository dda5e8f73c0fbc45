//! Sharded key/value cache guarded by a [`ReaderWriterLock`] per shard.
//!
//! A single lock over a whole map funnels every writer and blocks every
//! reader behind it. Sharding splits the key space across independently
//! locked partitions, so a write only serializes the shard its key hashes
//! to. The shard array is fixed at construction, which removes any need for
//! an outer lock: shard lookup is a pure read.
//!
//! The reader/writer policy comes entirely from the per-shard
//! `ReaderWriterLock`; the inner std mutex exists to satisfy shared-access
//! rules and is only ever taken under that lock.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex as StdMutex;

use crate::error::ConfigError;
use crate::rwlock::ReaderWriterLock;

struct Shard<V> {
    lock: ReaderWriterLock,
    items: StdMutex<HashMap<String, V>>,
}

/// A sharded in-memory cache with per-shard reader/writer locking.
pub struct ShardedCache<V> {
    shards: Box<[Shard<V>]>,
}

impl<V: Clone> ShardedCache<V> {
    /// Creates a cache with `shard_count` independently locked shards.
    ///
    /// Fair locks are used per shard so sustained read traffic cannot
    /// starve writes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidShardCount`] if `shard_count` is zero.
    pub fn new(shard_count: usize) -> Result<Self, ConfigError> {
        if shard_count == 0 {
            return Err(ConfigError::InvalidShardCount(shard_count));
        }
        Ok(Self {
            shards: (0..shard_count)
                .map(|_| Shard {
                    lock: ReaderWriterLock::new(true),
                    items: StdMutex::new(HashMap::new()),
                })
                .collect(),
        })
    }

    /// Looks up a value under the shard's read lock.
    pub async fn get(&self, key: &str) -> Option<V> {
        let shard = self.shard(key);
        shard.lock.read_lock().await;
        let value = shard
            .items
            .lock()
            .expect("shard map mutex poisoned")
            .get(key)
            .cloned();
        shard
            .lock
            .read_unlock()
            .await
            .expect("read lock held by this call");
        value
    }

    /// Inserts or replaces a value under the shard's write lock.
    pub async fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let shard = self.shard(&key);
        shard.lock.write_lock().await;
        shard
            .items
            .lock()
            .expect("shard map mutex poisoned")
            .insert(key, value);
        shard
            .lock
            .write_unlock()
            .expect("write lock held by this call");
    }

    /// Returns the number of entries across all shards.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.items.lock().expect("shard map mutex poisoned").len())
            .sum()
    }

    /// Returns whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self, key: &str) -> &Shard<V> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() % self.shards.len() as u64) as usize]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_zero_shards_is_rejected() {
        assert_eq!(
            ShardedCache::<u32>::new(0).err(),
            Some(ConfigError::InvalidShardCount(0))
        );
    }

    #[tokio::test]
    async fn test_any_positive_shard_count_routes_every_key() {
        // Shard selection is hash modulo count, so nothing requires a power
        // of two.
        for count in [1, 3, 7] {
            let cache = ShardedCache::new(count).unwrap();
            assert_eq!(cache.shard_count(), count);
            for i in 0..20u32 {
                cache.set(format!("key-{i}"), i).await;
            }
            for i in 0..20u32 {
                assert_eq!(cache.get(&format!("key-{i}")).await, Some(i));
            }
            assert_eq!(cache.len(), 20);
        }
    }

    #[tokio::test]
    async fn test_get_and_set() {
        let cache = ShardedCache::new(16).unwrap();
        assert_eq!(cache.get("missing").await, None);

        cache.set("alpha", 1u32).await;
        cache.set("beta", 2u32).await;
        assert_eq!(cache.get("alpha").await, Some(1));
        assert_eq!(cache.get("beta").await, Some(2));

        cache.set("alpha", 10u32).await;
        assert_eq!(cache.get("alpha").await, Some(10));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_readers_and_writers() {
        let cache = Arc::new(ShardedCache::new(8).unwrap());

        let mut handles = Vec::new();
        for worker in 0..8u32 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for i in 0..50u32 {
                    let key = format!("key-{}", i % 10);
                    if worker % 2 == 0 {
                        cache.set(key, worker * 1000 + i).await;
                    } else {
                        // Either absent or some writer's value; must not hang
                        // or tear.
                        let _ = cache.get(&key).await;
                    }
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(cache.len() <= 10);
    }
}
