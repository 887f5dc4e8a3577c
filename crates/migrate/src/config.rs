//! Engine configuration
//!
//! `MigrateConfig` is the fully resolved configuration handed to an engine.
//! Loading files, selecting profiles and blending overrides happen before it
//! is built.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::{MigrateError, MigrateResult};

/// Configuration for the migration engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateConfig {
    /// Directory where migration units are stored
    pub migrations_dir: PathBuf,
    /// Collection holding the ledger
    pub collection: String,
    /// File extension of migration units
    pub extension: String,
    /// Name of the unit run by `reset`
    pub reset_unit: String,
    /// Forward every operation to a remote endpoint instead of running locally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            collection: "_migrations".to_string(),
            extension: "json".to_string(),
            reset_unit: "latest".to_string(),
            proxy: None,
        }
    }
}

impl MigrateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_migrations_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn with_reset_unit(mut self, name: impl Into<String>) -> Self {
        self.reset_unit = name.into();
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Whether operations are forwarded to a remote endpoint
    pub fn is_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Check the configuration for missing values
    pub fn validate(&self) -> MigrateResult<()> {
        if self.collection.trim().is_empty() {
            return Err(MigrateError::configuration("Ledger collection name is empty"));
        }
        if self.extension.trim().is_empty() {
            return Err(MigrateError::configuration("Migration file extension is empty"));
        }
        if self.reset_unit.trim().is_empty() {
            return Err(MigrateError::configuration("Reset unit name is empty"));
        }
        if self.migrations_dir.as_os_str().is_empty() {
            return Err(MigrateError::configuration("Migrations directory is not set"));
        }
        Ok(())
    }
}

/// Remote invocation endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Endpoint receiving `POST` requests
    pub endpoint: Url,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl ProxyConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Parse an endpoint URL; only http and https are accepted
    pub fn parse(endpoint: &str) -> MigrateResult<Self> {
        let url = Url::parse(endpoint).map_err(|e| {
            MigrateError::configuration(format!("Invalid proxy endpoint '{}': {}", endpoint, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(MigrateError::configuration(format!(
                "Proxy endpoint must use http or https: {}",
                endpoint
            )));
        }
        Ok(Self::new(url))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
