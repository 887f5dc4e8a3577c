//! `migrate.toml` loading and profile blending
//!
//! ```toml
//! profile = "dev"
//!
//! [migrations]
//! dir = "./migrations"
//! collection = "_migrations"
//!
//! [storage]
//! backend = "local"
//! root = "./data"
//! table = "app"
//!
//! [profiles.prod.storage]
//! table = "app-prod"
//!
//! [profiles.remote.proxy]
//! endpoint = "https://migrate.example.com/invoke"
//! ```

use anyhow::{anyhow, Context, Result};
use kvmigrate::{MigrateConfig, ProxyConfig};
use kvmigrate_storage::{
    LocalBackend, LocalStorageConfig, MemoryBackend, Table, TableStore, DEFAULT_KEY_FIELD,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use toml::Value;

pub const DEFAULT_CONFIG_FILE: &str = "migrate.toml";
pub const DEFAULT_PROFILE: &str = "dev";
pub const PRODUCTION_PROFILE: &str = "prod";

/// Fully blended settings for one profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub profile: String,
    pub migrations: MigrationSettings,
    pub storage: StorageSettings,
    pub proxy: Option<ProxySettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    pub dir: PathBuf,
    pub collection: String,
    pub extension: String,
    pub reset_unit: String,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        let defaults = MigrateConfig::default();
        Self {
            dir: defaults.migrations_dir,
            collection: defaults.collection,
            extension: defaults.extension,
            reset_unit: defaults.reset_unit,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON files under `root/table`
    #[default]
    Local,
    /// Process memory; nothing survives the command
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: BackendKind,
    pub root: PathBuf,
    pub table: String,
    pub key_field: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            root: PathBuf::from("./data"),
            table: "default".to_string(),
            key_field: DEFAULT_KEY_FIELD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    pub endpoint: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub profile: Option<String>,
    pub endpoint: Option<String>,
}

impl Settings {
    pub fn is_production(&self) -> bool {
        self.profile == PRODUCTION_PROFILE
    }

    /// Engine configuration for these settings
    pub fn migrate_config(&self) -> Result<MigrateConfig> {
        let mut config = MigrateConfig::new()
            .with_migrations_dir(&self.migrations.dir)
            .with_collection(&self.migrations.collection)
            .with_extension(&self.migrations.extension)
            .with_reset_unit(&self.migrations.reset_unit);

        if let Some(proxy) = &self.proxy {
            let mut proxy_config = ProxyConfig::parse(&proxy.endpoint)?;
            if let Some(secs) = proxy.timeout_secs {
                proxy_config = proxy_config.with_timeout(Duration::from_secs(secs));
            }
            config = config.with_proxy(proxy_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Storage handle for local mode
    pub fn open_storage(&self) -> Arc<dyn TableStore> {
        let storage = &self.storage;
        match storage.backend {
            BackendKind::Local => Arc::new(Table::new(LocalBackend::new(
                LocalStorageConfig::new()
                    .with_root_path(&storage.root)
                    .with_table(&storage.table)
                    .with_key_field(&storage.key_field),
            ))),
            BackendKind::Memory => Arc::new(Table::new(MemoryBackend::new(&storage.key_field))),
        }
    }
}

/// Recursively merge `overlay` into `base`; tables merge, everything else replaces
pub fn blend(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base), Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => blend(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Profile chosen by flag, then file, then `MIGRATE_PROFILE`/`PROFILE`, then `dev`
pub fn select_profile(flag: Option<&str>, document: &Value) -> String {
    if let Some(profile) = flag.filter(|p| !p.is_empty()) {
        return profile.to_string();
    }
    if let Some(profile) = document.get("profile").and_then(Value::as_str) {
        return profile.to_string();
    }
    env::var("MIGRATE_PROFILE")
        .or_else(|_| env::var("PROFILE"))
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

/// Read and blend the configuration file; a missing file yields defaults
pub fn load(overrides: &Overrides) -> Result<Settings> {
    let path = overrides
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let document = if path.exists() {
        read_document(&path)?
    } else {
        if overrides.config_path.is_some() {
            return Err(anyhow!("Configuration file {} not found", path.display()));
        }
        tracing::debug!(path = %path.display(), "no configuration file, using defaults");
        Value::Table(Default::default())
    };

    resolve(document, overrides)
}

fn read_document(path: &Path) -> Result<Value> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration {}", path.display()))?;
    toml::from_str(&source).with_context(|| format!("Invalid configuration {}", path.display()))
}

/// Apply profile blending and overrides to a parsed document
pub fn resolve(mut document: Value, overrides: &Overrides) -> Result<Settings> {
    let profile = select_profile(overrides.profile.as_deref(), &document);

    if let Value::Table(table) = &mut document {
        let profiles = table.remove("profiles");
        table.remove("profile");

        match profiles.and_then(|mut profiles| match &mut profiles {
            Value::Table(all) => all.remove(&profile),
            _ => None,
        }) {
            Some(section) => blend(&mut document, section),
            None => tracing::debug!(profile = %profile, "profile has no overrides"),
        }
    }

    let mut settings: Settings = document
        .try_into()
        .context("Invalid migration configuration")?;
    settings.profile = profile;

    if let Some(endpoint) = &overrides.endpoint {
        let timeout_secs = settings.proxy.as_ref().and_then(|proxy| proxy.timeout_secs);
        settings.proxy = Some(ProxySettings {
            endpoint: endpoint.clone(),
            timeout_secs,
        });
    }

    tracing::debug!(profile = %settings.profile, proxy = settings.proxy.is_some(), "loaded settings");
    Ok(settings)
}
