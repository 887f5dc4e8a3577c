//! In-memory table backend

use crate::{item_key, Item, StorageError, StorageResult, TableStore, WriteOptions, DEFAULT_KEY_FIELD};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory table backend.
///
/// Collections keep their items in insertion order; overwriting an item keeps
/// its original position.
#[derive(Debug)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, Vec<Item>>>,
    key_field: String,
}

impl MemoryBackend {
    /// Create a new memory backend keyed by `key_field`
    pub fn new(key_field: impl Into<String>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            key_field: key_field.into(),
        }
    }

    /// Number of items in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |items| items.len())
    }

    /// Whether a collection holds no items
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn position(&self, items: &[Item], key: &str) -> Option<usize> {
        items.iter().position(|existing| {
            item_key(existing, &self.key_field)
                .map(|existing_key| existing_key == key)
                .unwrap_or(false)
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_FIELD)
    }
}

#[async_trait]
impl TableStore for MemoryBackend {
    fn key_field(&self) -> &str {
        &self.key_field
    }

    async fn create(
        &self,
        collection: &str,
        item: Item,
        options: WriteOptions,
    ) -> StorageResult<Item> {
        let key = item_key(&item, &self.key_field)?;
        let mut collections = self.collections.write();
        let items = collections.entry(collection.to_string()).or_default();
        let position = self.position(items, &key);

        options.check(collection, &key, position.is_some())?;

        match position {
            Some(index) => items[index] = item.clone(),
            None => items.push(item.clone()),
        }
        Ok(item)
    }

    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Item>> {
        let collections = self.collections.read();
        Ok(collections.get(collection).and_then(|items| {
            self.position(items, key).map(|index| items[index].clone())
        }))
    }

    async fn update(&self, collection: &str, key: &str, patch: Item) -> StorageResult<Item> {
        let mut collections = self.collections.write();
        let not_found = || StorageError::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        };
        let items = collections.get_mut(collection).ok_or_else(not_found)?;
        let index = self.position(items, key).ok_or_else(not_found)?;

        let target = &mut items[index];
        for (field, value) in patch {
            target.insert(field, value);
        }
        Ok(target.clone())
    }

    async fn remove(&self, collection: &str, key: &str) -> StorageResult<bool> {
        let mut collections = self.collections.write();
        let Some(items) = collections.get_mut(collection) else {
            return Ok(false);
        };
        match self.position(items, key) {
            Some(index) => {
                items.remove(index);
                if items.is_empty() {
                    collections.remove(collection);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan(&self, collection: &str) -> StorageResult<Vec<Item>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn collections(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
