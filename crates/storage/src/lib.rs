//! # kvmigrate-storage
//!
//! Record-level access to a key-value table store.
//!
//! ## Features
//!
//! - **Multi-backend support**: in-memory tables and JSON files on the local filesystem
//! - **Conditional writes**: create-if-absent, update-if-present or unconditional put
//! - **Collections**: every item lives in a named logical collection of one table
//! - **Async-first**: backends are shared as `Arc<dyn TableStore>` across tasks
//!
//! ## Quick Start
//!
//! ```rust
//! use kvmigrate_storage::{item, MemoryBackend, Table, TableStore, WriteOptions};
//!
//! # tokio_test::block_on(async {
//! let table = Table::new(MemoryBackend::default());
//!
//! let user = item(serde_json::json!({ "pk": "user:1", "name": "Ada" }));
//! table.create("User", user, WriteOptions::if_absent()).await.unwrap();
//!
//! let found = table.get("User", "user:1").await.unwrap();
//! assert_eq!(found.unwrap()["name"], "Ada");
//! # });
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod backends;
pub mod config;

pub use backends::*;
pub use config::*;

/// Storage operation errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Item already exists: {collection}/{key}")]
    AlreadyExists { collection: String, key: String },

    #[error("Item not found: {collection}/{key}")]
    NotFound { collection: String, key: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A stored item: a JSON object carrying its own key attribute.
pub type Item = Map<String, Value>;

/// Build an [`Item`] from a JSON value. Non-object values yield an empty item.
pub fn item(value: Value) -> Item {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Read the key of an item from its key attribute.
///
/// String and numeric attributes are accepted; anything else is rejected.
pub fn item_key(item: &Item, key_field: &str) -> StorageResult<String> {
    match item.get(key_field) {
        Some(Value::String(key)) if !key.is_empty() => Ok(key.clone()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        Some(other) => Err(StorageError::Validation(format!(
            "Key attribute '{}' must be a string or number, got {}",
            key_field, other
        ))),
        None => Err(StorageError::Validation(format!(
            "Item is missing key attribute '{}'",
            key_field
        ))),
    }
}

/// Existence condition for writes.
///
/// `Some(false)` only writes when the key is absent, `Some(true)` only when it
/// is present, and `None` writes unconditionally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    pub exists: Option<bool>,
}

impl WriteOptions {
    /// Unconditional put
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `AlreadyExists` if the key is present
    pub fn if_absent() -> Self {
        Self { exists: Some(false) }
    }

    /// Fail with `NotFound` if the key is absent
    pub fn if_present() -> Self {
        Self { exists: Some(true) }
    }

    /// Check the condition against the current state of the key
    pub fn check(&self, collection: &str, key: &str, present: bool) -> StorageResult<()> {
        match (self.exists, present) {
            (Some(false), true) => Err(StorageError::AlreadyExists {
                collection: collection.to_string(),
                key: key.to_string(),
            }),
            (Some(true), false) => Err(StorageError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Core table store trait that all backends must implement
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Attribute holding the item key
    fn key_field(&self) -> &str;

    /// Write an item, honouring the existence condition
    async fn create(
        &self,
        collection: &str,
        item: Item,
        options: WriteOptions,
    ) -> StorageResult<Item>;

    /// Fetch a single item by key
    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Item>>;

    /// Merge attributes into an existing item
    async fn update(&self, collection: &str, key: &str, patch: Item) -> StorageResult<Item>;

    /// Remove an item, returning whether it existed
    async fn remove(&self, collection: &str, key: &str) -> StorageResult<bool>;

    /// Read every item of a collection
    async fn scan(&self, collection: &str) -> StorageResult<Vec<Item>>;

    /// Names of the collections holding at least one item
    async fn collections(&self) -> StorageResult<Vec<String>>;
}

/// Table facade that validates requests before they reach the backend
pub struct Table<B: TableStore> {
    backend: B,
    config: StorageConfig,
}

impl<B: TableStore> Table<B> {
    /// Create a new table over a backend
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: StorageConfig::default(),
        }
    }

    /// Create a table with custom configuration
    pub fn with_config(backend: B, config: StorageConfig) -> Self {
        Self { backend, config }
    }

    /// Borrow the backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn validate_collection(&self, collection: &str) -> StorageResult<()> {
        validate_name(collection, self.config.max_name_length)
    }

    fn validate_key(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::Validation("Item key must not be empty".to_string()));
        }
        if key.len() > self.config.max_key_length {
            return Err(StorageError::Validation(format!(
                "Item key exceeds {} bytes",
                self.config.max_key_length
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<B: TableStore> TableStore for Table<B> {
    fn key_field(&self) -> &str {
        self.backend.key_field()
    }

    async fn create(
        &self,
        collection: &str,
        item: Item,
        options: WriteOptions,
    ) -> StorageResult<Item> {
        self.validate_collection(collection)?;
        let key = item_key(&item, self.backend.key_field())?;
        self.validate_key(&key)?;
        self.backend.create(collection, item, options).await
    }

    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Item>> {
        self.validate_collection(collection)?;
        self.validate_key(key)?;
        self.backend.get(collection, key).await
    }

    async fn update(&self, collection: &str, key: &str, patch: Item) -> StorageResult<Item> {
        self.validate_collection(collection)?;
        self.validate_key(key)?;
        if patch.contains_key(self.backend.key_field()) {
            return Err(StorageError::Validation(format!(
                "Updates may not change the key attribute '{}'",
                self.backend.key_field()
            )));
        }
        self.backend.update(collection, key, patch).await
    }

    async fn remove(&self, collection: &str, key: &str) -> StorageResult<bool> {
        self.validate_collection(collection)?;
        self.validate_key(key)?;
        self.backend.remove(collection, key).await
    }

    async fn scan(&self, collection: &str) -> StorageResult<Vec<Item>> {
        self.validate_collection(collection)?;
        self.backend.scan(collection).await
    }

    async fn collections(&self) -> StorageResult<Vec<String>> {
        self.backend.collections().await
    }
}

/// Collection names become file names on the local backend, so keep them tame.
fn validate_name(name: &str, max_length: usize) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::Validation(
            "Collection name must not be empty".to_string(),
        ));
    }
    if name.len() > max_length {
        return Err(StorageError::Validation(format!(
            "Collection name exceeds {} characters",
            max_length
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        || name.starts_with('.')
    {
        return Err(StorageError::Validation(format!(
            "Invalid collection name: {}",
            name
        )));
    }
    Ok(())
}
