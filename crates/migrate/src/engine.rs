//! Apply Engine - executes resolved plans against the table store
//!
//! [`MigrationEngine`] is the caller-facing contract. [`LocalEngine`] runs it
//! in-process over a ledger, a loader and a storage handle;
//! [`crate::proxy::ProxyEngine`] forwards the same calls to a remote endpoint.

use async_trait::async_trait;
use kvmigrate_storage::TableStore;
use std::sync::Arc;

use crate::config::MigrateConfig;
use crate::definitions::{
    Action, ApplyParams, ApplyReport, AppliedStep, MigrationPlan, MigrationRecord,
    MigrationStatus, PlannedStep, Target,
};
use crate::error::{MigrateError, MigrateResult};
use crate::ledger::{CreateMode, Ledger, TableLedger};
use crate::loader::{FileLoader, MigrationUnit, UnitLoader};
use crate::planner;
use crate::proxy::ProxyEngine;
use crate::resolver::VersionResolver;
use crate::version;

/// Operations shared by the local and the proxied engine
#[async_trait]
pub trait MigrationEngine: Send + Sync {
    /// Check that the engine can reach its ledger and catalog
    async fn init(&self) -> MigrateResult<()>;

    /// Highest successfully applied version, or `0.0.0`
    async fn get_current_version(&self) -> MigrateResult<String>;

    /// Catalog versions newer than current without a ledger record
    async fn get_outstanding_versions(&self, limit: Option<usize>) -> MigrateResult<Vec<String>>;

    /// Catalog units invoked by name
    async fn get_named_migrations(&self) -> MigrateResult<Vec<String>>;

    /// Ledger records, sorted
    async fn get_past_migrations(&self) -> MigrateResult<Vec<MigrationRecord>>;

    /// Resolve a target without running anything
    async fn plan(&self, target: &Target, params: &ApplyParams) -> MigrateResult<MigrationPlan>;

    /// Resolve a target and run its steps in order
    async fn apply(&self, target: &Target, params: &ApplyParams) -> MigrateResult<ApplyReport>;
}

/// Build the engine selected by the configuration.
///
/// A configured proxy endpoint selects [`ProxyEngine`]; otherwise a storage
/// handle is required and a [`LocalEngine`] reading units from disk is built.
pub fn build_engine(
    config: MigrateConfig,
    store: Option<Arc<dyn TableStore>>,
) -> MigrateResult<Arc<dyn MigrationEngine>> {
    config.validate()?;

    if config.is_proxy() {
        return Ok(Arc::new(ProxyEngine::new(config)?));
    }

    let store = store.ok_or_else(|| {
        MigrateError::configuration("A storage handle is required when no proxy endpoint is set")
    })?;
    Ok(Arc::new(LocalEngine::new(config, store)))
}

/// Engine running migrations in-process
pub struct LocalEngine {
    config: MigrateConfig,
    store: Arc<dyn TableStore>,
    ledger: Arc<dyn Ledger>,
    loader: Arc<dyn UnitLoader>,
}

impl LocalEngine {
    /// Engine with a table ledger and a file loader taken from `config`
    pub fn new(config: MigrateConfig, store: Arc<dyn TableStore>) -> Self {
        let ledger = TableLedger::new(store.clone(), config.collection.clone());
        let loader = FileLoader::new(config.migrations_dir.clone(), config.extension.clone());
        Self {
            config,
            store,
            ledger: Arc::new(ledger),
            loader: Arc::new(loader),
        }
    }

    /// Replace the unit loader
    pub fn with_loader<L: UnitLoader + 'static>(mut self, loader: L) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Replace the ledger
    pub fn with_ledger<L: Ledger + 'static>(mut self, ledger: L) -> Self {
        self.ledger = Arc::new(ledger);
        self
    }

    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    async fn resolver(&self) -> MigrateResult<VersionResolver> {
        let records = self.ledger.list().await?;
        let catalog = self.loader.catalog().await?;
        Ok(VersionResolver::new(records, catalog))
    }

    async fn clear_ledger(&self) -> MigrateResult<()> {
        for record in self.ledger.list().await? {
            self.ledger.remove(&record.version).await?;
        }
        tracing::debug!(collection = %self.config.collection, "cleared ledger");
        Ok(())
    }

    /// Whether a reset step runs the reset unit rather than replaying a version
    fn is_reset_unit(step: &PlannedStep) -> bool {
        step.action == Action::Reset && !version::is_semver(&step.version)
    }

    async fn run_unit(
        &self,
        step: &PlannedStep,
        unit: &MigrationUnit,
        params: &ApplyParams,
    ) -> anyhow::Result<()> {
        if step.action == Action::Down {
            unit.task.down(self.store.as_ref(), self, params).await
        } else {
            unit.task.up(self.store.as_ref(), self, params).await
        }
    }

    async fn record_success(
        &self,
        step: &PlannedStep,
        unit: &MigrationUnit,
        resolver: &VersionResolver,
    ) -> MigrateResult<()> {
        match step.action {
            Action::Down => self.ledger.remove(&step.version).await,
            Action::Up => {
                let record = MigrationRecord::new(&step.version, &unit.description, &unit.path);
                self.ledger.create(&record, CreateMode::FailIfExists).await
            }
            Action::Reset if Self::is_reset_unit(step) => {
                self.clear_ledger().await?;
                match resolver.latest_catalog_version() {
                    Some(latest) => {
                        let record = MigrationRecord::new(latest, &unit.description, &unit.path);
                        self.ledger.create(&record, CreateMode::Overwrite).await
                    }
                    None => Ok(()),
                }
            }
            Action::Retry | Action::Repeat | Action::Reset | Action::Named => {
                let record = MigrationRecord::new(&step.version, &unit.description, &unit.path);
                self.ledger.create(&record, CreateMode::Overwrite).await
            }
        }
    }

    async fn record_failure(&self, step: &PlannedStep, unit: &MigrationUnit) -> MigrateResult<()> {
        let record = MigrationRecord::new(&step.version, &unit.description, &unit.path)
            .with_status(MigrationStatus::Failed);
        self.ledger.create(&record, CreateMode::Overwrite).await
    }
}

#[async_trait]
impl MigrationEngine for LocalEngine {
    async fn init(&self) -> MigrateResult<()> {
        self.config.validate()?;
        let resolver = self.resolver().await?;
        tracing::info!(
            dir = %self.config.migrations_dir.display(),
            collection = %self.config.collection,
            current = %resolver.current_version(),
            "migration engine ready"
        );
        Ok(())
    }

    async fn get_current_version(&self) -> MigrateResult<String> {
        let records = self.ledger.list().await?;
        Ok(VersionResolver::new(records, Vec::new()).current_version())
    }

    async fn get_outstanding_versions(&self, limit: Option<usize>) -> MigrateResult<Vec<String>> {
        Ok(self.resolver().await?.outstanding_versions(limit))
    }

    async fn get_named_migrations(&self) -> MigrateResult<Vec<String>> {
        let catalog = self.loader.catalog().await?;
        Ok(VersionResolver::with_empty_ledger(catalog).named_migrations())
    }

    async fn get_past_migrations(&self) -> MigrateResult<Vec<MigrationRecord>> {
        let records = self.ledger.list().await?;
        Ok(VersionResolver::new(records, Vec::new()).past_migrations())
    }

    async fn plan(&self, target: &Target, params: &ApplyParams) -> MigrateResult<MigrationPlan> {
        let resolver = self.resolver().await?;
        planner::plan(&resolver, target, params, &self.config.reset_unit)
    }

    async fn apply(&self, target: &Target, params: &ApplyParams) -> MigrateResult<ApplyReport> {
        let resolver = self.resolver().await?;
        let plan = planner::plan(&resolver, target, params, &self.config.reset_unit)?;

        if let Some(reason) = &plan.noop {
            tracing::info!(mode = %target, "{}", reason);
        }

        // Replaying every version starts from an empty ledger
        let replay = plan
            .steps
            .iter()
            .any(|step| step.action == Action::Reset && !Self::is_reset_unit(step));
        if replay && !params.dry {
            self.clear_ledger().await?;
        }

        let mut applied: Vec<AppliedStep> = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            let unit = self.loader.load(&step.version).await?;
            tracing::info!(
                version = %step.version,
                action = %step.action,
                path = %unit.path,
                dry = params.dry,
                "{} {}: {}",
                step.action.verb(),
                step.version,
                unit.description
            );

            if let Err(err) = self.run_unit(step, &unit, params).await {
                tracing::error!(
                    version = %step.version,
                    action = %step.action,
                    "migration failed: {:#}",
                    err
                );
                let mut message = format!("{:#}", err);
                if step.action.is_up_class() && !params.dry {
                    // the partial-applied list outlives a ledger write failure
                    if let Err(write_err) = self.record_failure(step, &unit).await {
                        tracing::error!(
                            version = %step.version,
                            "could not record failed migration: {}",
                            write_err
                        );
                        message = format!("{} (failure not recorded: {})", message, write_err);
                    }
                }
                return Err(MigrateError::Execution {
                    version: step.version.clone(),
                    action: step.action,
                    applied: applied.iter().map(|done| done.version.clone()).collect(),
                    message,
                });
            }

            if !params.dry {
                self.record_success(step, &unit, &resolver).await?;
            }

            applied.push(AppliedStep {
                version: step.version.clone(),
                action: step.action,
                description: unit.description.clone(),
                path: unit.path.clone(),
            });
        }

        let current = if params.dry {
            plan.current.clone()
        } else {
            self.get_current_version().await?
        };

        Ok(ApplyReport {
            target: target.clone(),
            dry: params.dry,
            current,
            steps: applied,
            noop: plan.noop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{MigrationTask, RegistryLoader};
    use kvmigrate_storage::{item, MemoryBackend, StorageError, WriteOptions};
    use serde_json::json;

    /// Writes a marker item on `up`, removes it on `down`
    struct Marker;

    #[async_trait]
    impl MigrationTask for Marker {
        fn description(&self) -> &str {
            "marker"
        }

        async fn up(
            &self,
            store: &dyn TableStore,
            engine: &dyn MigrationEngine,
            params: &ApplyParams,
        ) -> anyhow::Result<()> {
            if params.dry {
                return Ok(());
            }
            let current = engine.get_current_version().await?;
            store
                .create(
                    "Marker",
                    item(json!({ "pk": "marker", "seen": current })),
                    WriteOptions::new(),
                )
                .await?;
            Ok(())
        }

        async fn down(
            &self,
            store: &dyn TableStore,
            _engine: &dyn MigrationEngine,
            params: &ApplyParams,
        ) -> anyhow::Result<()> {
            if !params.dry {
                store.remove("Marker", "marker").await?;
            }
            Ok(())
        }
    }

    fn engine() -> (Arc<MemoryBackend>, LocalEngine) {
        let store = Arc::new(MemoryBackend::default());
        let engine = LocalEngine::new(MigrateConfig::default(), store.clone())
            .with_loader(RegistryLoader::new().register("1.0.0", Marker));
        (store, engine)
    }

    #[tokio::test]
    async fn test_unit_sees_engine_state() {
        let (store, engine) = engine();
        let report = engine.apply(&Target::Up, &ApplyParams::new()).await.unwrap();
        assert_eq!(report.versions(), vec!["1.0.0"]);
        assert_eq!(report.current, "1.0.0");

        // the unit ran before its record was written
        let marker = store.get("Marker", "marker").await.unwrap().unwrap();
        assert_eq!(marker["seen"], "0.0.0");
    }

    #[tokio::test]
    async fn test_dry_run_leaves_ledger_untouched() {
        let (store, engine) = engine();
        let report = engine
            .apply(&Target::Up, &ApplyParams::new().dry())
            .await
            .unwrap();
        assert!(report.dry);
        assert_eq!(report.versions(), vec!["1.0.0"]);
        assert_eq!(report.current, "0.0.0");
        assert!(store.is_empty("_migrations"));
        assert!(store.is_empty("Marker"));
    }

    struct Broken;

    #[async_trait]
    impl MigrationTask for Broken {
        fn description(&self) -> &str {
            "broken"
        }

        async fn up(
            &self,
            _store: &dyn TableStore,
            _engine: &dyn MigrationEngine,
            _params: &ApplyParams,
        ) -> anyhow::Result<()> {
            anyhow::bail!("boom")
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

    /// Ledger that refuses to store failed records
    struct RejectFailed(TableLedger);

    #[async_trait]
    impl Ledger for RejectFailed {
        async fn list(&self) -> MigrateResult<Vec<MigrationRecord>> {
            self.0.list().await
        }

        async fn create(&self, record: &MigrationRecord, mode: CreateMode) -> MigrateResult<()> {
            if record.is_failed() {
                return Err(StorageError::Backend("ledger offline".to_string()).into());
            }
            self.0.create(record, mode).await
        }

        async fn remove(&self, version: &str) -> MigrateResult<()> {
            self.0.remove(version).await
        }
    }

    #[tokio::test]
    async fn test_failure_keeps_applied_when_ledger_write_fails() {
        let store = Arc::new(MemoryBackend::default());
        let ledger = RejectFailed(TableLedger::new(store.clone(), "_migrations"));
        let engine = LocalEngine::new(MigrateConfig::default(), store.clone())
            .with_loader(
                RegistryLoader::new()
                    .register("1.0.0", Marker)
                    .register("1.1.0", Broken),
            )
            .with_ledger(ledger);

        match engine.apply(&Target::All, &ApplyParams::new()).await {
            Err(MigrateError::Execution {
                version,
                applied,
                message,
                ..
            }) => {
                assert_eq!(version, "1.1.0");
                assert_eq!(applied, vec!["1.0.0"]);
                assert!(message.contains("boom"));
                assert!(message.contains("ledger offline"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(engine.get_current_version().await.unwrap(), "1.0.0");
    }

    #[test]
    fn test_build_engine_requires_store() {
        let result = build_engine(MigrateConfig::default(), None);
        assert!(matches!(result, Err(MigrateError::Configuration(_))));

        let store: Arc<dyn TableStore> = Arc::new(MemoryBackend::default());
        assert!(build_engine(MigrateConfig::default(), Some(store)).is_ok());
    }
}
