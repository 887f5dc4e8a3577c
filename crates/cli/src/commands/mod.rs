pub mod apply;
pub mod generate;
pub mod inspect;
pub mod serve;

use anyhow::Result;
use kvmigrate::{build_engine, ApplyParams, MigrateConfig, MigrationEngine};
use std::sync::Arc;

use crate::config::Settings;

/// Everything a command needs: settings, the selected engine and run flags
pub struct Context {
    pub settings: Settings,
    pub config: MigrateConfig,
    pub engine: Arc<dyn MigrationEngine>,
    pub params: ApplyParams,
    pub force: bool,
}

impl Context {
    /// Build the engine the settings select (proxy or local)
    pub fn new(settings: Settings, params: ApplyParams, force: bool) -> Result<Self> {
        let config = settings.migrate_config()?;
        let store = if config.is_proxy() {
            None
        } else {
            Some(settings.open_storage())
        };
        let engine = build_engine(config.clone(), store)?;

        tracing::debug!(
            profile = %settings.profile,
            proxy = config.is_proxy(),
            dir = %config.migrations_dir.display(),
            "engine selected"
        );

        Ok(Self {
            settings,
            config,
            engine,
            params,
            force,
        })
    }

    pub fn profile(&self) -> &str {
        &self.settings.profile
    }
}
