//! # dblog Store
//!
//! Ordered key-value store capability used by dblog.
//!
//! The log engine never depends on a concrete database. It talks to the
//! [`Store`] trait, which offers exactly what a time-ordered log needs:
//! idempotent namespace setup, put, get, ordered range scans and delete.
//!
//! ## Backends
//!
//! - **InMemoryStore**: ordered in-memory tables for tests and simulation
//! - **RedbStore**: durable single-file storage on redb
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use dblog_store::{InMemoryStore, KeyRange, Store};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = InMemoryStore::new();
//!     store.setup_namespace(&HashMap::from([("log".to_string(), 1)])).await.unwrap();
//!
//!     store.put("log", b"a", b"first").await.unwrap();
//!     store.put("log", b"b", b"second").await.unwrap();
//!
//!     let entries = store.scan("log", &KeyRange::all(), 100).await.unwrap();
//!     assert_eq!(entries.len(), 2);
//! }
//! ```

pub mod error;
pub mod memory;
pub mod persistent;

// Re-exports
pub use error::StoreError;
pub use memory::InMemoryStore;
pub use persistent::{RedbStore, RedbStoreConfig};

use std::collections::HashMap;
use std::ops::Bound;

use async_trait::async_trait;

/// Type alias for scan results to simplify complex type
pub type ScanResults = Vec<(Vec<u8>, Vec<u8>)>;

/// Half-open key range `[start, end)` over raw key bytes
///
/// `None` on either side means the range is unbounded on that side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower bound
    pub start: Option<Vec<u8>>,
    /// Exclusive upper bound
    pub end: Option<Vec<u8>>,
}

impl KeyRange {
    /// Range covering every key
    pub fn all() -> Self {
        Self::default()
    }

    /// Range with explicit bounds
    pub fn new(start: Option<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
        Self { start, end }
    }

    /// Range from `start` (inclusive) with no upper bound
    pub fn starting_at(start: impl Into<Vec<u8>>) -> Self {
        Self {
            start: Some(start.into()),
            end: None,
        }
    }

    /// True when no key can fall inside the range
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => start >= end,
            _ => false,
        }
    }

    /// Check whether `key` falls inside the range
    pub fn contains(&self, key: &[u8]) -> bool {
        let above_start = self.start.as_deref().is_none_or(|start| key >= start);
        let below_end = self.end.as_deref().is_none_or(|end| key < end);
        above_start && below_end
    }

    /// Borrow the range as a pair of standard bounds
    pub fn as_bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        let lower = match &self.start {
            Some(start) => Bound::Included(start.as_slice()),
            None => Bound::Unbounded,
        };
        let upper = match &self.end {
            Some(end) => Bound::Excluded(end.as_slice()),
            None => Bound::Unbounded,
        };
        (lower, upper)
    }
}

/// Ordered byte-keyed storage capability
///
/// Implementations must return scan results in ascending byte order of the
/// key and must treat `setup_namespace` as idempotent. Every table used with
/// `put`, `get`, `scan` or `delete` has to be set up first.
///
/// The store is a long-lived shared resource; callers hold it as
/// `Arc<dyn Store>` and never need to release anything explicitly.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create the given tables if they do not exist yet
    ///
    /// The map value is the number of shards a backend may use for the
    /// table. Single-node backends ignore it.
    async fn setup_namespace(&self, tables: &HashMap<String, u32>) -> Result<(), StoreError>;

    /// Insert or overwrite a value
    async fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Fetch a single value
    async fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Return at most `limit` entries of `range` in ascending key order
    ///
    /// An empty or inverted range yields no entries.
    async fn scan(
        &self,
        table: &str,
        range: &KeyRange,
        limit: usize,
    ) -> Result<ScanResults, StoreError>;

    /// Remove a key, returning whether it existed
    async fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the Store trait is object-safe
    fn _assert_object_safe(_: &dyn Store) {}

    #[test]
    fn test_key_range_contains() {
        let range = KeyRange::new(Some(b"b".to_vec()), Some(b"d".to_vec()));
        assert!(!range.contains(b"a"));
        assert!(range.contains(b"b"));
        assert!(range.contains(b"c"));
        assert!(!range.contains(b"d"));

        assert!(KeyRange::all().contains(b"anything"));
        assert!(KeyRange::starting_at(b"m".to_vec()).contains(b"z"));
    }

    #[test]
    fn test_key_range_is_empty() {
        assert!(!KeyRange::all().is_empty());
        assert!(KeyRange::new(Some(b"b".to_vec()), Some(b"b".to_vec())).is_empty());
        assert!(KeyRange::new(Some(b"c".to_vec()), Some(b"a".to_vec())).is_empty());
        assert!(!KeyRange::new(None, Some(b"a".to_vec())).is_empty());
    }
}
