//! In-memory store implementation
//!
//! Ordered tables kept in `BTreeMap`s, suitable for testing and simulation
//! environments. Nothing survives the process.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::{KeyRange, ScanResults, Store};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory implementation of [`Store`]
///
/// Each table is a `BTreeMap`, so scans come back in byte order for free.
/// The store can be switched offline to exercise error paths in callers.
#[derive(Debug)]
pub struct InMemoryStore {
    /// Table name -> ordered entries
    tables: RwLock<HashMap<String, Table>>,
    /// When false every operation fails with `StoreError::Unavailable`
    available: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backend going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of entries in a table, zero if the table does not exist
    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    /// Check whether a table has no entries
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("in-memory store is offline"))
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn setup_namespace(&self, tables: &HashMap<String, u32>) -> Result<(), StoreError> {
        self.check_available()?;
        let mut guard = self.tables.write();
        for name in tables.keys() {
            guard.entry(name.clone()).or_default();
        }
        debug!(tables = tables.len(), "Set up in-memory namespace");
        Ok(())
    }

    async fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.check_available()?;
        let mut guard = self.tables.write();
        let entries = guard
            .get_mut(table)
            .ok_or_else(|| StoreError::unknown_table(table))?;
        entries.insert(key.to_vec(), value.to_vec());
        trace!(table, key_len = key.len(), value_len = value.len(), "put");
        Ok(())
    }

    async fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_available()?;
        let guard = self.tables.read();
        let entries = guard
            .get(table)
            .ok_or_else(|| StoreError::unknown_table(table))?;
        Ok(entries.get(key).cloned())
    }

    async fn scan(
        &self,
        table: &str,
        range: &KeyRange,
        limit: usize,
    ) -> Result<ScanResults, StoreError> {
        self.check_available()?;
        let guard = self.tables.read();
        let entries = guard
            .get(table)
            .ok_or_else(|| StoreError::unknown_table(table))?;

        // BTreeMap::range panics on inverted bounds
        if range.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let results: ScanResults = entries
            .range::<[u8], _>(range.as_bounds())
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        trace!(table, returned = results.len(), "scan");
        Ok(results)
    }

    async fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut guard = self.tables.write();
        let entries = guard
            .get_mut(table)
            .ok_or_else(|| StoreError::unknown_table(table))?;
        Ok(entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace(table: &str) -> HashMap<String, u32> {
        HashMap::from([(table.to_string(), 1)])
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryStore::new();
        store.setup_namespace(&namespace("log")).await.unwrap();

        store.put("log", b"key", b"value").await.unwrap();
        assert_eq!(
            store.get("log", b"key").await.unwrap(),
            Some(b"value".to_vec())
        );

        assert!(store.delete("log", b"key").await.unwrap());
        assert!(!store.delete("log", b"key").await.unwrap());
        assert!(store.get("log", b"key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_setup_namespace_is_idempotent() {
        let store = InMemoryStore::new();
        store.setup_namespace(&namespace("log")).await.unwrap();
        store.put("log", b"k", b"v").await.unwrap();

        // Setting up again must not wipe existing entries
        store.setup_namespace(&namespace("log")).await.unwrap();
        assert_eq!(store.len("log"), 1);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let store = InMemoryStore::new();
        let err = store.put("missing", b"k", b"v").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownTable(_)));
    }

    #[tokio::test]
    async fn test_scan_is_ordered_and_half_open() {
        let store = InMemoryStore::new();
        store.setup_namespace(&namespace("log")).await.unwrap();

        for key in [b"d", b"a", b"c", b"b", b"e"] {
            store.put("log", key, key).await.unwrap();
        }

        let all = store.scan("log", &KeyRange::all(), 100).await.unwrap();
        let keys: Vec<_> = all.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]
        );

        let range = KeyRange::new(Some(b"b".to_vec()), Some(b"d".to_vec()));
        let middle = store.scan("log", &range, 100).await.unwrap();
        assert_eq!(middle.len(), 2);
        assert_eq!(middle[0].0, b"b".to_vec());
        assert_eq!(middle[1].0, b"c".to_vec());

        let limited = store.scan("log", &KeyRange::all(), 3).await.unwrap();
        assert_eq!(limited.len(), 3);
    }

    #[tokio::test]
    async fn test_scan_inverted_range_is_empty() {
        let store = InMemoryStore::new();
        store.setup_namespace(&namespace("log")).await.unwrap();
        store.put("log", b"b", b"v").await.unwrap();

        let inverted = KeyRange::new(Some(b"z".to_vec()), Some(b"a".to_vec()));
        assert!(store.scan("log", &inverted, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_store() {
        let store = InMemoryStore::new();
        store.setup_namespace(&namespace("log")).await.unwrap();
        store.set_available(false);

        let err = store.put("log", b"k", b"v").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_available(true);
        store.put("log", b"k", b"v").await.unwrap();
    }
}
