//! In-memory cache store.

use crate::{CacheKey, CacheRecord, CacheStore, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Cache store backed by a hash map.
///
/// Nothing survives the process; useful for tests and for hosts without
/// persistent storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<CacheKey, CacheRecord>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn put(&self, key: CacheKey, record: CacheRecord) -> Result<()> {
        self.records.write().insert(key, record);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self.records.read().keys().cloned().collect())
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.records.write().remove(key).is_some())
    }

    fn clear_partition(&self, partition: &str) -> Result<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|key, _| key.partition != partition);
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchway_types::Headers;
    use serde_json::json;

    fn record(signature: &str) -> CacheRecord {
        CacheRecord {
            signature: signature.to_string(),
            etag: "\"e\"".to_string(),
            status: 200,
            body: json!({}),
            headers: Headers::new(),
            stored_at: 0,
        }
    }

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();
        let key = CacheKey::new("etags-cache-1", "GET user/");

        store.put(key.clone(), record("GET user/")).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(&key).unwrap().is_some());

        assert!(store.delete(&key).unwrap());
        assert!(!store.delete(&key).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_partitions_and_clear() {
        let store = MemoryStore::new();
        store
            .put(CacheKey::new("a-1", "GET x/"), record("GET x/"))
            .unwrap();
        store
            .put(CacheKey::new("a-1", "GET y/"), record("GET y/"))
            .unwrap();
        store
            .put(CacheKey::new("a-2", "GET x/"), record("GET x/"))
            .unwrap();

        assert_eq!(store.partitions().unwrap(), vec!["a-1", "a-2"]);
        assert_eq!(store.clear_partition("a-1").unwrap(), 2);
        assert_eq!(store.partitions().unwrap(), vec!["a-2"]);
    }
}
