//! Durable store on redb
//!
//! Each logical table is a redb table of raw byte keys to raw byte values.
//! redb keeps keys in byte order, which is all the log engine relies on.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::{KeyRange, ScanResults, Store};

/// Configuration for redb storage
#[derive(Debug, Clone)]
pub struct RedbStoreConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Cache size in bytes
    pub cache_size: usize,
}

impl Default for RedbStoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/dblog.redb"),
            cache_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// redb-backed implementation of [`Store`]
///
/// redb transactions are blocking, so every operation runs on tokio's
/// blocking pool. The database handle is shared behind an `Arc`.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    config: RedbStoreConfig,
}

fn definition(table: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(table)
}

fn table_error(table: &str, err: TableError) -> StoreError {
    match err {
        TableError::TableDoesNotExist(_) => StoreError::unknown_table(table),
        other => StoreError::database(other),
    }
}

impl RedbStore {
    /// Open or create the database
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: RedbStoreConfig) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = redb::Builder::new()
            .set_cache_size(config.cache_size)
            .create(&config.db_path)
            .map_err(StoreError::database)?;

        info!("Opened redb database");

        Ok(Self {
            db: Arc::new(db),
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &RedbStoreConfig {
        &self.config
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))?
    }
}

#[async_trait]
impl Store for RedbStore {
    async fn setup_namespace(&self, tables: &HashMap<String, u32>) -> Result<(), StoreError> {
        let names: Vec<String> = tables.keys().cloned().collect();
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(StoreError::database)?;

            // Create tables if they don't exist
            for name in &names {
                write_txn
                    .open_table(definition(name))
                    .map_err(|e| table_error(name, e))?;
            }

            write_txn.commit().map_err(StoreError::database)?;

            debug!(tables = names.len(), "Initialized redb tables");
            Ok(())
        })
        .await
    }

    async fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let (table, key, value) = (table.to_string(), key.to_vec(), value.to_vec());
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(StoreError::database)?;

            {
                let mut entries = write_txn
                    .open_table(definition(&table))
                    .map_err(|e| table_error(&table, e))?;
                entries
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(StoreError::database)?;
            }

            write_txn.commit().map_err(StoreError::database)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let (table, key) = (table.to_string(), key.to_vec());
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(StoreError::database)?;
            let entries = read_txn
                .open_table(definition(&table))
                .map_err(|e| table_error(&table, e))?;

            let value = entries
                .get(key.as_slice())
                .map_err(StoreError::database)?
                .map(|v| v.value().to_vec());

            Ok(value)
        })
        .await
    }

    async fn scan(
        &self,
        table: &str,
        range: &KeyRange,
        limit: usize,
    ) -> Result<ScanResults, StoreError> {
        let (table, range) = (table.to_string(), range.clone());
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(StoreError::database)?;
            let entries = read_txn
                .open_table(definition(&table))
                .map_err(|e| table_error(&table, e))?;

            let mut results = Vec::new();
            if range.is_empty() || limit == 0 {
                return Ok(results);
            }

            let iter = entries
                .range::<&[u8]>(range.as_bounds())
                .map_err(StoreError::database)?;

            for entry in iter.take(limit) {
                let (key, value) = entry.map_err(StoreError::database)?;
                results.push((key.value().to_vec(), value.value().to_vec()));
            }

            Ok(results)
        })
        .await
    }

    async fn delete(&self, table: &str, key: &[u8]) -> Result<bool, StoreError> {
        let (table, key) = (table.to_string(), key.to_vec());
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(StoreError::database)?;

            let removed = {
                let mut entries = write_txn
                    .open_table(definition(&table))
                    .map_err(|e| table_error(&table, e))?;
                entries
                    .remove(key.as_slice())
                    .map_err(StoreError::database)?
                    .is_some()
            };

            write_txn.commit().map_err(StoreError::database)?;
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RedbStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbStoreConfig {
            db_path: temp_dir.path().join("test.redb"),
            ..Default::default()
        };
        let store = RedbStore::open(config).unwrap();
        (store, temp_dir)
    }

    fn namespace(table: &str) -> HashMap<String, u32> {
        HashMap::from([(table.to_string(), 1)])
    }

    #[tokio::test]
    async fn test_put_get() {
        let (store, _temp) = create_test_store();
        store.setup_namespace(&namespace("log")).await.unwrap();

        store.put("log", b"test_key", b"test_value").await.unwrap();

        let retrieved = store.get("log", b"test_key").await.unwrap();
        assert_eq!(retrieved, Some(b"test_value".to_vec()));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _temp) = create_test_store();
        store.setup_namespace(&namespace("log")).await.unwrap();

        store.put("log", b"delete_me", b"value").await.unwrap();
        assert!(store.delete("log", b"delete_me").await.unwrap());
        assert!(store.get("log", b"delete_me").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let (store, _temp) = create_test_store();
        let err = store.scan("nope", &KeyRange::all(), 10).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownTable(_)));
    }

    #[tokio::test]
    async fn test_scan_range() {
        let (store, _temp) = create_test_store();
        store.setup_namespace(&namespace("log")).await.unwrap();

        for i in 0u8..10 {
            store.put("log", &[i], &[i]).await.unwrap();
        }

        let range = KeyRange::new(Some(vec![3]), Some(vec![7]));
        let results = store.scan("log", &range, 100).await.unwrap();
        let keys: Vec<u8> = results.iter().map(|(k, _)| k[0]).collect();
        assert_eq!(keys, vec![3, 4, 5, 6]);

        let limited = store.scan("log", &KeyRange::starting_at(vec![5]), 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].0, vec![5]);

        let inverted = KeyRange::new(Some(vec![8]), Some(vec![2]));
        assert!(store.scan("log", &inverted, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbStoreConfig {
            db_path: temp_dir.path().join("reopen.redb"),
            ..Default::default()
        };

        {
            let store = RedbStore::open(config.clone()).unwrap();
            store.setup_namespace(&namespace("log")).await.unwrap();
            store.put("log", b"k", b"v").await.unwrap();
        }

        let store = RedbStore::open(config).unwrap();
        store.setup_namespace(&namespace("log")).await.unwrap();
        assert_eq!(store.get("log", b"k").await.unwrap(), Some(b"v".to_vec()));
    }
}
