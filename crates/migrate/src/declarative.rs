//! Declarative migration units
//!
//! The on-disk unit format: a JSON document listing the table operations to
//! run for `up` and for `down`.
//!
//! ```json
//! {
//!     "description": "Add default roles",
//!     "up": [
//!         { "op": "create", "collection": "Role", "item": { "pk": "role:admin", "name": "admin" } },
//!         { "op": "update", "collection": "User", "key": "user:1", "set": { "role": "admin" } }
//!     ],
//!     "down": [
//!         { "op": "remove", "collection": "Role", "key": "role:admin" }
//!     ]
//! }
//! ```

use anyhow::Context;
use async_trait::async_trait;
use kvmigrate_storage::{Item, TableStore, WriteOptions};
use serde::{Deserialize, Serialize};

use crate::definitions::ApplyParams;
use crate::engine::MigrationEngine;
use crate::loader::MigrationTask;

/// A single table operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    /// Write an item; `exists` follows [`WriteOptions`]
    Create {
        collection: String,
        item: Item,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exists: Option<bool>,
    },
    /// Merge attributes into an existing item
    Update {
        collection: String,
        key: String,
        set: Item,
    },
    /// Remove an item; a missing item is only logged
    Remove { collection: String, key: String },
}

impl Operation {
    async fn run(&self, store: &dyn TableStore) -> anyhow::Result<()> {
        match self {
            Operation::Create {
                collection,
                item,
                exists,
            } => {
                store
                    .create(collection, item.clone(), WriteOptions { exists: *exists })
                    .await
                    .with_context(|| format!("create in {} failed", collection))?;
            }
            Operation::Update {
                collection,
                key,
                set,
            } => {
                store
                    .update(collection, key, set.clone())
                    .await
                    .with_context(|| format!("update of {}/{} failed", collection, key))?;
            }
            Operation::Remove { collection, key } => {
                let removed = store
                    .remove(collection, key)
                    .await
                    .with_context(|| format!("remove of {}/{} failed", collection, key))?;
                if !removed {
                    tracing::warn!(collection = %collection, key = %key, "item to remove was absent");
                }
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        match self {
            Operation::Create { collection, .. } => format!("create in {}", collection),
            Operation::Update { collection, key, .. } => format!("update {}/{}", collection, key),
            Operation::Remove { collection, key } => format!("remove {}/{}", collection, key),
        }
    }
}

/// Unit parsed from a declarative file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub description: String,
    #[serde(default = "default_enable")]
    pub enable: bool,
    #[serde(default)]
    pub up: Vec<Operation>,
    #[serde(default)]
    pub down: Vec<Operation>,
}

fn default_enable() -> bool {
    true
}

impl DeclarativeTask {
    /// Parse a unit document
    pub fn from_json(source: &str) -> serde_json::Result<Self> {
        serde_json::from_str(source)
    }

    async fn run_all(
        &self,
        phase: &str,
        operations: &[Operation],
        store: &dyn TableStore,
        params: &ApplyParams,
    ) -> anyhow::Result<()> {
        for (index, operation) in operations.iter().enumerate() {
            if params.dry {
                tracing::info!(phase, step = index + 1, "dry run: skipping {}", operation.describe());
                continue;
            }
            operation
                .run(store)
                .await
                .with_context(|| format!("{} step {}", phase, index + 1))?;
        }
        Ok(())
    }
}

#[async_trait]
impl MigrationTask for DeclarativeTask {
    fn description(&self) -> &str {
        &self.description
    }

    fn enable(&self) -> bool {
        self.enable
    }

    async fn up(
        &self,
        store: &dyn TableStore,
        _engine: &dyn MigrationEngine,
        params: &ApplyParams,
    ) -> anyhow::Result<()> {
        self.run_all("up", &self.up, store, params).await
    }

    async fn down(
        &self,
        store: &dyn TableStore,
        _engine: &dyn MigrationEngine,
        params: &ApplyParams,
    ) -> anyhow::Result<()> {
        self.run_all("down", &self.down, store, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvmigrate_storage::MemoryBackend;

    const UNIT: &str = r#"{
        "description": "Add admin role",
        "up": [
            { "op": "create", "collection": "Role", "item": { "pk": "admin", "level": 9 }, "exists": false },
            { "op": "update", "collection": "Role", "key": "admin", "set": { "label": "Admin" } }
        ],
        "down": [
            { "op": "remove", "collection": "Role", "key": "admin" }
        ]
    }"#;

    #[test]
    fn test_parse_unit() {
        let task = DeclarativeTask::from_json(UNIT).unwrap();
        assert_eq!(task.description, "Add admin role");
        assert!(task.enable);
        assert_eq!(task.up.len(), 2);
        assert_eq!(task.down.len(), 1);

        let disabled: DeclarativeTask =
            serde_json::from_str(r#"{ "description": "off", "enable": false }"#).unwrap();
        assert!(!disabled.enable);
        assert!(disabled.up.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_ops() {
        let result = DeclarativeTask::from_json(
            r#"{ "description": "x", "up": [ { "op": "drop", "collection": "Role" } ] }"#,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_operations_run_in_order() {
        let task = DeclarativeTask::from_json(UNIT).unwrap();
        let store = MemoryBackend::default();

        task.run_all("up", &task.up, &store, &ApplyParams::new()).await.unwrap();
        let role = store.get("Role", "admin").await.unwrap().unwrap();
        assert_eq!(role["label"], "Admin");
        assert_eq!(role["level"], 9);

        task.run_all("down", &task.down, &store, &ApplyParams::new()).await.unwrap();
        assert!(store.get("Role", "admin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dry_run_skips_writes() {
        let task = DeclarativeTask::from_json(UNIT).unwrap();
        let store = MemoryBackend::default();

        task.run_all("up", &task.up, &store, &ApplyParams::new().dry())
            .await
            .unwrap();
        assert!(store.is_empty("Role"));
    }

    #[tokio::test]
    async fn test_failing_operation_reports_step() {
        let task = DeclarativeTask::from_json(
            r#"{ "description": "x", "up": [ { "op": "update", "collection": "Role", "key": "ghost", "set": {} } ] }"#,
        )
        .unwrap();
        let store = MemoryBackend::default();

        let err = task
            .run_all("up", &task.up, &store, &ApplyParams::new())
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).starts_with("up step 1"));
    }
}
