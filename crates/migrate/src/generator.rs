//! Migration stub generator
//!
//! Writes an empty declarative unit for the next version.

use semver::{BuildMetadata, Prerelease, Version};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::MigrateConfig;
use crate::declarative::DeclarativeTask;
use crate::engine::MigrationEngine;
use crate::error::{MigrateError, MigrateResult};
use crate::version::{self, ZERO_VERSION};

/// Which version component to increment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Bump {
    Major,
    Minor,
    #[default]
    Patch,
}

impl Bump {
    /// Apply the bump, dropping build metadata.
    ///
    /// A pre-release is released by the smallest bump that reaches it:
    /// `1.2.3-beta.1` patches to `1.2.3`, `2.0.0-rc.1` goes major to `2.0.0`.
    pub fn apply(&self, from: &Version) -> Version {
        let released = from.pre.is_empty();
        let mut next = match self {
            Bump::Major if released || from.minor != 0 || from.patch != 0 => {
                Version::new(from.major + 1, 0, 0)
            }
            Bump::Major => Version::new(from.major, 0, 0),
            Bump::Minor if released || from.patch != 0 => Version::new(from.major, from.minor + 1, 0),
            Bump::Minor => Version::new(from.major, from.minor, 0),
            Bump::Patch if released => Version::new(from.major, from.minor, from.patch + 1),
            Bump::Patch => Version::new(from.major, from.minor, from.patch),
        };
        next.pre = Prerelease::EMPTY;
        next.build = BuildMetadata::EMPTY;
        next
    }
}

impl FromStr for Bump {
    type Err = MigrateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "major" => Ok(Bump::Major),
            "minor" => Ok(Bump::Minor),
            "patch" => Ok(Bump::Patch),
            other => Err(MigrateError::configuration(format!(
                "Unknown version bump '{}', expected major, minor or patch",
                other
            ))),
        }
    }
}

impl fmt::Display for Bump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bump::Major => write!(f, "major"),
            Bump::Minor => write!(f, "minor"),
            Bump::Patch => write!(f, "patch"),
        }
    }
}

/// A stub written by [`generate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMigration {
    pub version: String,
    pub path: PathBuf,
}

/// Version the next stub gets: the newest outstanding version, else current, bumped
pub async fn next_version(engine: &dyn MigrationEngine, bump: Bump) -> MigrateResult<String> {
    let outstanding = engine.get_outstanding_versions(None).await?;
    let base = match outstanding.last() {
        Some(newest) => newest.clone(),
        None => engine.get_current_version().await?,
    };

    let base = version::parse_semver(&base)
        .or_else(|| version::parse_semver(ZERO_VERSION))
        .ok_or_else(|| MigrateError::configuration("Cannot determine base version"))?;
    Ok(bump.apply(&base).to_string())
}

/// Write a stub unit for the next version into the migrations directory
pub async fn generate(
    engine: &dyn MigrationEngine,
    config: &MigrateConfig,
    bump: Bump,
    description: Option<&str>,
) -> MigrateResult<GeneratedMigration> {
    // Ensure migrations directory exists
    fs::create_dir_all(&config.migrations_dir).map_err(|e| {
        MigrateError::filesystem(
            format!(
                "Failed to create migrations directory {}",
                config.migrations_dir.display()
            ),
            e,
        )
    })?;

    let version = next_version(engine, bump).await?;

    let path = config
        .migrations_dir
        .join(format!("{}.{}", version, config.extension));
    if path.exists() {
        return Err(MigrateError::Conflict(version));
    }

    let stub = DeclarativeTask {
        version: Some(version.clone()),
        description: description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Migration {}", version)),
        enable: true,
        up: Vec::new(),
        down: Vec::new(),
    };
    let body = serde_json::to_string_pretty(&stub).map_err(|e| {
        MigrateError::load(&version, format!("Failed to render migration stub: {}", e))
    })?;

    fs::write(&path, body + "\n").map_err(|e| {
        MigrateError::filesystem(format!("Failed to write {}", path.display()), e)
    })?;

    tracing::info!(version = %version, path = %path.display(), "generated migration");
    Ok(GeneratedMigration { version, path })
}
