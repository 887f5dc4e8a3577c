//! Local filesystem table backend
//!
//! Each collection is a JSON array stored at `<root>/<table>/<collection>.json`.

use crate::config::LocalStorageConfig;
use crate::{item_key, Item, StorageError, StorageResult, TableStore, WriteOptions};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Local filesystem table backend
#[derive(Debug)]
pub struct LocalBackend {
    config: LocalStorageConfig,
    write_lock: Mutex<()>,
}

impl LocalBackend {
    /// Create a new local table backend
    pub fn new(config: LocalStorageConfig) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
        }
    }

    /// Borrow the configuration
    pub fn config(&self) -> &LocalStorageConfig {
        &self.config
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.config
            .table_path()
            .join(format!("{}.json", collection))
    }

    async fn ensure_table_dir(&self) -> StorageResult<()> {
        let dir = self.config.table_path();
        if dir.exists() {
            return Ok(());
        }
        if !self.config.create_directories {
            return Err(StorageError::Configuration(format!(
                "Table directory does not exist: {}",
                dir.display()
            )));
        }
        fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create directory {}: {}", dir.display(), e),
            ))
        })?;
        Ok(())
    }

    async fn read_collection(&self, collection: &str) -> StorageResult<Vec<Item>> {
        let path = self.collection_path(collection);
        match fs::read(&path).await {
            Ok(bytes) => {
                let items: Vec<Item> = serde_json::from_slice(&bytes)?;
                Ok(items)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write_collection(&self, collection: &str, items: Vec<Item>) -> StorageResult<()> {
        let path = self.collection_path(collection);
        if items.is_empty() {
            return match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StorageError::Io(e)),
            };
        }

        self.ensure_table_dir().await?;
        let bytes = if self.config.pretty {
            serde_json::to_vec_pretty(&items)?
        } else {
            serde_json::to_vec(&items)?
        };

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StorageError::Backend(format!("Write task failed: {}", e)))?
    }

    fn position(&self, items: &[Item], key: &str) -> Option<usize> {
        items.iter().position(|existing| {
            item_key(existing, &self.config.key_field)
                .map(|existing_key| existing_key == key)
                .unwrap_or(false)
        })
    }
}

/// Replace `path` with `bytes` through a temp file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StorageError::Backend(format!("No parent for {}", path.display())))?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl TableStore for LocalBackend {
    fn key_field(&self) -> &str {
        &self.config.key_field
    }

    async fn create(
        &self,
        collection: &str,
        item: Item,
        options: WriteOptions,
    ) -> StorageResult<Item> {
        let key = item_key(&item, &self.config.key_field)?;
        let _guard = self.write_lock.lock().await;

        let mut items = self.read_collection(collection).await?;
        let position = self.position(&items, &key);
        options.check(collection, &key, position.is_some())?;

        match position {
            Some(index) => items[index] = item.clone(),
            None => items.push(item.clone()),
        }
        self.write_collection(collection, items).await?;

        tracing::trace!(collection, key = %key, "stored item");
        Ok(item)
    }

    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Item>> {
        let items = self.read_collection(collection).await?;
        Ok(self.position(&items, key).map(|index| items[index].clone()))
    }

    async fn update(&self, collection: &str, key: &str, patch: Item) -> StorageResult<Item> {
        let _guard = self.write_lock.lock().await;

        let mut items = self.read_collection(collection).await?;
        let index = self
            .position(&items, key)
            .ok_or_else(|| StorageError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            })?;

        for (field, value) in patch {
            items[index].insert(field, value);
        }
        let updated = items[index].clone();
        self.write_collection(collection, items).await?;
        Ok(updated)
    }

    async fn remove(&self, collection: &str, key: &str) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().await;

        let mut items = self.read_collection(collection).await?;
        match self.position(&items, key) {
            Some(index) => {
                items.remove(index);
                self.write_collection(collection, items).await?;
                tracing::trace!(collection, key, "removed item");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan(&self, collection: &str) -> StorageResult<Vec<Item>> {
        self.read_collection(collection).await
    }

    async fn collections(&self) -> StorageResult<Vec<String>> {
        let dir = self.config.table_path();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
