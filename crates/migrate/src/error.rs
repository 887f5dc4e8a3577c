//! Error types for the migration engine

use kvmigrate_storage::StorageError;
use thiserror::Error;

use crate::definitions::Action;

/// Result type alias for engine operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error kinds raised by the ledger, catalog, loader, engine and proxy
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Missing or invalid engine configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unreadable migrations directory or unit file
    #[error("Filesystem error: {message}")]
    Filesystem {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A migration unit is absent or malformed
    #[error("Cannot load migration '{id}': {message}")]
    Load { id: String, message: String },

    /// Requested version or name is not in the relevant set
    #[error("Cannot find target migration {target}: {message}")]
    TargetNotFound { target: String, message: String },

    /// Ledger create on a version that already has a record
    #[error("Migration {0} is already recorded")]
    Conflict(String),

    /// Ledger remove on a version without a record
    #[error("Migration {0} is not recorded")]
    NotFound(String),

    /// A unit's `up` or `down` failed; `applied` lists the steps completed before it
    #[error("Migration {version} failed during {action}: {message}")]
    Execution {
        version: String,
        action: Action,
        applied: Vec<String>,
        message: String,
    },

    /// Remote invocation transport or response failure
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// Storage failure not covered by another kind
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MigrateError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a filesystem error wrapping an IO failure
    pub fn filesystem(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Filesystem {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a load error
    pub fn load(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create a target-not-found error
    pub fn target_not_found(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TargetNotFound {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a proxy error
    pub fn proxy(message: impl Into<String>) -> Self {
        Self::Proxy(message.into())
    }

    /// Stable name of the error kind, used on the proxy wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::Filesystem { .. } => "FilesystemError",
            Self::Load { .. } => "LoadError",
            Self::TargetNotFound { .. } => "TargetNotFound",
            Self::Conflict(_) => "Conflict",
            Self::NotFound(_) => "NotFound",
            Self::Execution { .. } => "ExecutionFailure",
            Self::Proxy(_) => "ProxyError",
            Self::Storage(_) => "StorageError",
        }
    }

    /// Versions applied before the failure, for execution failures
    pub fn applied(&self) -> &[String] {
        match self {
            Self::Execution { applied, .. } => applied,
            _ => &[],
        }
    }
}
