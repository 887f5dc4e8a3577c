//! # kvmigrate: Versioned Migrations for Key-Value Tables
//!
//! Tracks which migrations have been applied to a table in a ledger
//! collection, works out which remain outstanding, and runs units forward,
//! backward or by name. The same [`MigrationEngine`] contract is served
//! in-process by [`LocalEngine`] or forwarded to a remote endpoint by
//! [`ProxyEngine`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use kvmigrate::{ApplyParams, LocalEngine, MigrateConfig, MigrationEngine, Target};
//! use kvmigrate_storage::MemoryBackend;
//!
//! # async fn run() -> kvmigrate::MigrateResult<()> {
//! let config = MigrateConfig::new().with_migrations_dir("./migrations");
//! let engine = LocalEngine::new(config, Arc::new(MemoryBackend::default()));
//!
//! let report = engine.apply(&Target::All, &ApplyParams::new()).await?;
//! println!("now at {}", report.current);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod declarative;
pub mod definitions;
pub mod engine;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod loader;
pub mod planner;
pub mod proxy;
pub mod resolver;
pub mod version;

// Re-export core traits and types
pub use config::{MigrateConfig, ProxyConfig};
pub use declarative::{DeclarativeTask, Operation};
pub use definitions::*;
pub use engine::{build_engine, LocalEngine, MigrationEngine};
pub use error::{MigrateError, MigrateResult};
pub use generator::{generate, Bump, GeneratedMigration};
pub use ledger::{CreateMode, Ledger, TableLedger};
pub use loader::{FileLoader, MigrationTask, MigrationUnit, RegistryLoader, UnitLoader};
pub use proxy::{dispatch, ProxyEngine, ProxyRequest, ProxyResponse};
pub use resolver::VersionResolver;
pub use version::{VersionId, ZERO_VERSION};
