//! Migration Loader - resolves identifiers to runnable units
//!
//! The engine only sees [`MigrationTask`] through a [`UnitLoader`]. Units come
//! either from declarative files on disk ([`FileLoader`]) or from tasks compiled
//! into the binary ([`RegistryLoader`]).

use async_trait::async_trait;
use kvmigrate_storage::TableStore;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog;
use crate::declarative::DeclarativeTask;
use crate::definitions::{ApplyParams, CatalogEntry};
use crate::engine::MigrationEngine;
use crate::error::{MigrateError, MigrateResult};
use crate::version;

/// Capability pair run by the engine for one migration
#[async_trait]
pub trait MigrationTask: Send + Sync {
    /// Human-readable purpose, stored in the ledger
    fn description(&self) -> &str;

    /// Disabled units are left out of the catalog
    fn enable(&self) -> bool {
        true
    }

    /// Apply the migration
    async fn up(
        &self,
        store: &dyn TableStore,
        engine: &dyn MigrationEngine,
        params: &ApplyParams,
    ) -> anyhow::Result<()>;

    /// Revert the migration
    async fn down(
        &self,
        store: &dyn TableStore,
        engine: &dyn MigrationEngine,
        params: &ApplyParams,
    ) -> anyhow::Result<()>;
}

/// A loaded unit, held only for the duration of one step
#[derive(Clone)]
pub struct MigrationUnit {
    pub id: String,
    pub description: String,
    pub path: String,
    pub task: Arc<dyn MigrationTask>,
}

impl MigrationUnit {
    pub fn new(id: impl Into<String>, path: impl Into<String>, task: Arc<dyn MigrationTask>) -> Self {
        Self {
            id: id.into(),
            description: task.description().to_string(),
            path: path.into(),
            task,
        }
    }
}

impl fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("path", &self.path)
            .finish()
    }
}

/// Source of migration units
#[async_trait]
pub trait UnitLoader: Send + Sync {
    /// Enabled units, semver-ascending then named
    async fn catalog(&self) -> MigrateResult<Vec<CatalogEntry>>;

    /// Resolve one identifier
    async fn load(&self, id: &str) -> MigrateResult<MigrationUnit>;
}

/// Loads declarative JSON units from a directory
#[derive(Debug, Clone)]
pub struct FileLoader {
    dir: PathBuf,
    extension: String,
}

impl FileLoader {
    pub fn new<P: Into<PathBuf>>(dir: P, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a unit identifier resolves to
    pub fn unit_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, self.extension))
    }

    fn read_task(&self, id: &str, path: &Path) -> MigrateResult<DeclarativeTask> {
        if !path.is_file() {
            return Err(MigrateError::load(
                id,
                format!("file {} not found", path.display()),
            ));
        }
        let source = fs::read_to_string(path).map_err(|e| {
            MigrateError::filesystem(format!("Failed to read {}", path.display()), e)
        })?;
        DeclarativeTask::from_json(&source)
            .map_err(|e| MigrateError::load(id, format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl UnitLoader for FileLoader {
    async fn catalog(&self) -> MigrateResult<Vec<CatalogEntry>> {
        let entries = catalog::scan(&self.dir, Some(&self.extension))?;

        let mut enabled = Vec::with_capacity(entries.len());
        for entry in entries {
            // Malformed units stay listed; loading them reports the error
            match self.read_task(&entry.id, &entry.path) {
                Ok(task) if !task.enable => {
                    tracing::trace!(id = %entry.id, "skipping disabled migration");
                }
                _ => enabled.push(entry),
            }
        }
        Ok(enabled)
    }

    async fn load(&self, id: &str) -> MigrateResult<MigrationUnit> {
        let path = self.unit_path(id);
        let task = self.read_task(id, &path)?;

        if let Some(declared) = task.version.as_deref() {
            if declared != id {
                tracing::warn!(
                    id,
                    declared,
                    path = %path.display(),
                    "unit declares a different version than its file name"
                );
            }
        }

        tracing::trace!(id, path = %path.display(), "loaded migration");
        Ok(MigrationUnit::new(id, path.display().to_string(), Arc::new(task)))
    }
}

/// Units compiled into the program, registered by identifier
#[derive(Clone, Default)]
pub struct RegistryLoader {
    units: BTreeMap<String, Arc<dyn MigrationTask>>,
}

impl RegistryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit, replacing any previous one with the same identifier
    pub fn register<T>(mut self, id: impl Into<String>, task: T) -> Self
    where
        T: MigrationTask + 'static,
    {
        self.units.insert(id.into(), Arc::new(task));
        self
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn path_of(id: &str) -> String {
        format!("registry://{}", id)
    }
}

#[async_trait]
impl UnitLoader for RegistryLoader {
    async fn catalog(&self) -> MigrateResult<Vec<CatalogEntry>> {
        let (mut versions, named): (Vec<CatalogEntry>, Vec<CatalogEntry>) = self
            .units
            .iter()
            .filter(|(_, task)| task.enable())
            .map(|(id, _)| CatalogEntry::new(id.clone(), Self::path_of(id)))
            .partition(|entry| entry.is_semver());

        versions.sort_by(|a, b| {
            version::compare(&a.id, &b.id).unwrap_or(std::cmp::Ordering::Equal)
        });
        versions.extend(named);
        Ok(versions)
    }

    async fn load(&self, id: &str) -> MigrateResult<MigrationUnit> {
        let task = self
            .units
            .get(id)
            .cloned()
            .ok_or_else(|| MigrateError::load(id, "no unit registered with this identifier"))?;
        Ok(MigrationUnit::new(id, Self::path_of(id), task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Noop(&'static str, bool);

    #[async_trait]
    impl MigrationTask for Noop {
        fn description(&self) -> &str {
            self.0
        }

        fn enable(&self) -> bool {
            self.1
        }

        async fn up(
            &self,
            _store: &dyn TableStore,
            _engine: &dyn MigrationEngine,
            _params: &ApplyParams,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn down(
            &self,
            _store: &dyn TableStore,
            _engine: &dyn MigrationEngine,
            _params: &ApplyParams,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn write(dir: &TempDir, name: &str, body: &str) {
        fs::write(dir.path().join(name), body).unwrap();
    }

    #[tokio::test]
    async fn test_file_loader_skips_disabled_units() {
        let dir = TempDir::new().unwrap();
        write(&dir, "1.0.0.json", r#"{ "description": "first" }"#);
        write(&dir, "1.1.0.json", r#"{ "description": "off", "enable": false }"#);
        write(&dir, "seed.json", r#"{ "description": "seed" }"#);
        write(&dir, "notes.txt", "ignored");

        let loader = FileLoader::new(dir.path(), "json");
        let ids: Vec<String> = loader
            .catalog()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.id)
            .collect();
        assert_eq!(ids, vec!["1.0.0", "seed"]);
    }

    #[tokio::test]
    async fn test_file_loader_load() {
        let dir = TempDir::new().unwrap();
        write(&dir, "1.0.0.json", r#"{ "description": "first", "up": [] }"#);
        write(&dir, "2.0.0.json", r#"{ "up": [] }"#);

        let loader = FileLoader::new(dir.path(), ".json");
        let unit = loader.load("1.0.0").await.unwrap();
        assert_eq!(unit.description, "first");
        assert!(unit.path.ends_with("1.0.0.json"));

        let missing = loader.load("3.0.0").await;
        assert!(matches!(missing, Err(MigrateError::Load { id, .. }) if id == "3.0.0"));

        // description is required
        let malformed = loader.load("2.0.0").await;
        assert!(matches!(malformed, Err(MigrateError::Load { .. })));
    }

    #[tokio::test]
    async fn test_registry_loader() {
        let loader = RegistryLoader::new()
            .register("2.0.0", Noop("two", true))
            .register("seed", Noop("seed", true))
            .register("1.10.0", Noop("ten", true))
            .register("1.2.0", Noop("hidden", false));

        let ids: Vec<String> = loader
            .catalog()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.id)
            .collect();
        assert_eq!(ids, vec!["1.10.0", "2.0.0", "seed"]);

        let unit = loader.load("seed").await.unwrap();
        assert_eq!(unit.path, "registry://seed");
        assert!(loader.load("absent").await.is_err());
    }
}
