//! Storage configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default attribute holding item keys
pub const DEFAULT_KEY_FIELD: &str = "pk";

/// Request validation limits applied by [`crate::Table`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Maximum collection name length
    pub max_name_length: usize,

    /// Maximum item key length in bytes
    pub max_key_length: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_name_length: 128,
            max_key_length: 1024,
        }
    }
}

impl StorageConfig {
    /// Create a new storage configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum collection name length
    pub fn with_max_name_length(mut self, length: usize) -> Self {
        self.max_name_length = length;
        self
    }

    /// Set maximum key length
    pub fn with_max_key_length(mut self, length: usize) -> Self {
        self.max_key_length = length;
        self
    }
}

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory holding one directory per table
    pub root_path: PathBuf,

    /// Table name (directory under the root)
    pub table: String,

    /// Attribute holding item keys
    pub key_field: String,

    /// Create directories if they don't exist
    pub create_directories: bool,

    /// Pretty-print collection files
    pub pretty: bool,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("./data"),
            table: "default".to_string(),
            key_field: DEFAULT_KEY_FIELD.to_string(),
            create_directories: true,
            pretty: true,
        }
    }
}

impl LocalStorageConfig {
    /// Create new local storage configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set root path
    pub fn with_root_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.root_path = path.into();
        self
    }

    /// Set table name
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set key attribute
    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self
    }

    /// Disable automatic directory creation
    pub fn no_create_directories(mut self) -> Self {
        self.create_directories = false;
        self
    }

    /// Write compact JSON
    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    /// Directory holding the table's collection files
    pub fn table_path(&self) -> PathBuf {
        self.root_path.join(&self.table)
    }
}
