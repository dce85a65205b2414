//! Cache store trait.
//!
//! Defines the minimal interface the overlay needs from a persistent
//! key/record store, so hosts can plug in memory, disk or anything else.

use crate::{CacheKey, CacheRecord, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Trait for cache record stores.
pub trait CacheStore: Send + Sync {
    /// Retrieves a record.
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>>;

    /// Stores or overwrites a record.
    fn put(&self, key: CacheKey, record: CacheRecord) -> Result<()>;

    /// Lists every stored key.
    fn keys(&self) -> Result<Vec<CacheKey>>;

    /// Deletes a record, returning whether it existed.
    fn delete(&self, key: &CacheKey) -> Result<bool>;

    /// Lists the partitions that hold at least one record.
    fn partitions(&self) -> Result<Vec<String>> {
        let partitions: BTreeSet<String> =
            self.keys()?.into_iter().map(|key| key.partition).collect();
        Ok(partitions.into_iter().collect())
    }

    /// Deletes every record of a partition, returning how many were removed.
    fn clear_partition(&self, partition: &str) -> Result<usize> {
        let mut removed = 0;
        for key in self.keys()? {
            if key.partition == partition && self.delete(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        (**self).get(key)
    }

    fn put(&self, key: CacheKey, record: CacheRecord) -> Result<()> {
        (**self).put(key, record)
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        (**self).keys()
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        (**self).delete(key)
    }

    fn partitions(&self) -> Result<Vec<String>> {
        (**self).partitions()
    }

    fn clear_partition(&self, partition: &str) -> Result<usize> {
        (**self).clear_partition(partition)
    }
}
