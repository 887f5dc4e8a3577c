//! Ledger Store - persisted record of applied migrations
//!
//! The ledger is a single collection of the table store, keyed by version.
//! It makes no ordering promises; the resolver sorts what it reads.

use async_trait::async_trait;
use kvmigrate_storage::{Item, StorageError, TableStore, WriteOptions};
use serde_json::Value;
use std::sync::Arc;

use crate::definitions::MigrationRecord;
use crate::error::{MigrateError, MigrateResult};

/// How `create` treats an existing record for the same version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Fail with `Conflict`
    FailIfExists,
    /// Replace it in place
    Overwrite,
}

/// Persistence contract for migration records
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Read every record
    async fn list(&self) -> MigrateResult<Vec<MigrationRecord>>;

    /// Write a record
    async fn create(&self, record: &MigrationRecord, mode: CreateMode) -> MigrateResult<()>;

    /// Delete the record for a version
    async fn remove(&self, version: &str) -> MigrateResult<()>;
}

/// Ledger stored in a collection of a [`TableStore`]
#[derive(Clone)]
pub struct TableLedger {
    store: Arc<dyn TableStore>,
    collection: String,
}

impl TableLedger {
    pub fn new(store: Arc<dyn TableStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn to_item(&self, record: &MigrationRecord) -> MigrateResult<Item> {
        let mut item = match serde_json::to_value(record).map_err(StorageError::from)? {
            Value::Object(map) => map,
            _ => Item::new(),
        };
        item.insert(
            self.store.key_field().to_string(),
            Value::String(record.version.clone()),
        );
        Ok(item)
    }
}

#[async_trait]
impl Ledger for TableLedger {
    async fn list(&self) -> MigrateResult<Vec<MigrationRecord>> {
        let items = self.store.scan(&self.collection).await?;
        tracing::debug!(collection = %self.collection, count = items.len(), "read ledger");

        items
            .into_iter()
            .map(|item| {
                serde_json::from_value(Value::Object(item))
                    .map_err(|e| MigrateError::Storage(StorageError::Serialization(e)))
            })
            .collect()
    }

    async fn create(&self, record: &MigrationRecord, mode: CreateMode) -> MigrateResult<()> {
        let item = self.to_item(record)?;
        let options = match mode {
            CreateMode::FailIfExists => WriteOptions::if_absent(),
            CreateMode::Overwrite => WriteOptions::new(),
        };

        match self.store.create(&self.collection, item, options).await {
            Ok(_) => {
                tracing::debug!(
                    version = %record.version,
                    status = %record.status,
                    "recorded migration"
                );
                Ok(())
            }
            Err(StorageError::AlreadyExists { .. }) => {
                Err(MigrateError::Conflict(record.version.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, version: &str) -> MigrateResult<()> {
        if self.store.remove(&self.collection, version).await? {
            tracing::debug!(version, "removed migration record");
            Ok(())
        } else {
            Err(MigrateError::NotFound(version.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::MigrationStatus;
    use kvmigrate_storage::MemoryBackend;

    fn ledger() -> (Arc<MemoryBackend>, TableLedger) {
        let store = Arc::new(MemoryBackend::default());
        let ledger = TableLedger::new(store.clone(), "_migrations");
        (store, ledger)
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (store, ledger) = ledger();
        let record = MigrationRecord::new("1.0.0", "Initial", "migrations/1.0.0.json");
        ledger.create(&record, CreateMode::FailIfExists).await.unwrap();

        let records = ledger.list().await.unwrap();
        assert_eq!(records, vec![record]);

        // stored under the backend key attribute
        let item = store.get("_migrations", "1.0.0").await.unwrap().unwrap();
        assert_eq!(item["pk"], "1.0.0");
        assert_eq!(item["status"], "success");
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let (_, ledger) = ledger();
        let record = MigrationRecord::new("1.0.0", "Initial", "1.0.0.json");
        ledger.create(&record, CreateMode::FailIfExists).await.unwrap();

        let result = ledger.create(&record, CreateMode::FailIfExists).await;
        assert!(matches!(result, Err(MigrateError::Conflict(v)) if v == "1.0.0"));

        let failed = record.clone().with_status(MigrationStatus::Failed);
        ledger.create(&failed, CreateMode::Overwrite).await.unwrap();
        let records = ledger.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_failed());
    }

    #[tokio::test]
    async fn test_remove() {
        let (_, ledger) = ledger();
        ledger
            .create(&MigrationRecord::new("1.0.0", "Initial", "1.0.0.json"), CreateMode::FailIfExists)
            .await
            .unwrap();

        ledger.remove("1.0.0").await.unwrap();
        assert!(ledger.list().await.unwrap().is_empty());
        assert!(matches!(
            ledger.remove("1.0.0").await,
            Err(MigrateError::NotFound(v)) if v == "1.0.0"
        ));
    }
}
