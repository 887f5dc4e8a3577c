//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the ledger record, catalog entries, movement targets, plans and
//! reports shared by the local engine and the proxy adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::MigrateError;
use crate::version::{self, VersionId};

/// Outcome stored with a ledger record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    /// Applied successfully. Legacy records without a status are successes.
    #[default]
    Success,
    /// The unit failed; the record marks it for a later retry
    Failed,
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStatus::Success => write!(f, "success"),
            MigrationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Persisted ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Semantic version or migration name
    pub version: String,
    /// Human-readable purpose
    pub description: String,
    /// When the migration was applied
    pub date: DateTime<Utc>,
    /// Source location of the unit
    pub path: String,
    #[serde(default)]
    pub status: MigrationStatus,
    /// Tie-breaker for records sharing a version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

impl MigrationRecord {
    /// Create a successful record dated now
    pub fn new(
        version: impl Into<String>,
        description: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            description: description.into(),
            date: Utc::now(),
            path: path.into(),
            status: MigrationStatus::Success,
            order: None,
        }
    }

    /// Set the status
    pub fn with_status(mut self, status: MigrationStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the tie-break order
    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    /// Set the application date
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == MigrationStatus::Failed
    }

    /// Whether the record's version is a semantic version
    pub fn is_semver(&self) -> bool {
        version::is_semver(&self.version)
    }
}

/// A migration unit discovered in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Version or name, derived from the file stem
    pub id: String,
    /// Where the unit is defined
    pub path: PathBuf,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    pub fn version_id(&self) -> Option<VersionId> {
        VersionId::parse(&self.id)
    }

    pub fn is_semver(&self) -> bool {
        version::is_semver(&self.id)
    }
}

/// What the engine does with one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Apply an outstanding version
    Up,
    /// Revert an applied version
    Down,
    /// Re-run `up` for a version recorded as failed
    Retry,
    /// Re-run `up` for the most recent ledger entry
    Repeat,
    /// Rebuild from an empty ledger
    Reset,
    /// Run a named migration
    Named,
}

impl Action {
    /// Every action except `Down` runs the unit's `up` and writes a record
    pub fn is_up_class(&self) -> bool {
        !matches!(self, Action::Down)
    }

    /// Past-tense verb for reports
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Up => "Upgrade to",
            Action::Down => "Downgrade from",
            Action::Retry => "Retried",
            Action::Repeat => "Repeated",
            Action::Reset => "Reset to",
            Action::Named => "Ran",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Up => "up",
            Action::Down => "down",
            Action::Retry => "retry",
            Action::Repeat => "repeat",
            Action::Reset => "reset",
            Action::Named => "named",
        };
        write!(f, "{}", name)
    }
}

/// Parameters passed through to every unit invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyParams {
    /// Units must skip persistent side effects; the ledger is left untouched
    #[serde(default)]
    pub dry: bool,
    /// A bare `up` first re-runs the trailing failed ledger entries
    #[serde(default)]
    pub retry_failed: bool,
}

impl ApplyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry(mut self) -> Self {
        self.dry = true;
        self
    }

    pub fn retry_failed(mut self) -> Self {
        self.retry_failed = true;
        self
    }
}

/// Requested movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Target {
    /// Apply the next outstanding version
    Up,
    /// Revert the most recent semver ledger entry
    Down,
    /// Rebuild through the reset unit (`reset` or `latest`)
    Reset,
    /// Re-run the most recent ledger entry
    Repeat,
    /// Move up to the newest outstanding version
    All,
    /// Move up or down to a concrete version
    Version(String),
    /// Run a named migration
    Named(String),
}

impl Target {
    /// The token form of the target
    pub fn as_token(&self) -> &str {
        match self {
            Target::Up => "up",
            Target::Down => "down",
            Target::Reset => "reset",
            Target::Repeat => "repeat",
            Target::All => "all",
            Target::Version(version) => version,
            Target::Named(name) => name,
        }
    }
}

impl FromStr for Target {
    type Err = MigrateError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        Ok(match token {
            "" => {
                return Err(MigrateError::target_not_found(
                    "<empty>",
                    "a migration target is required",
                ))
            }
            "up" => Target::Up,
            "down" => Target::Down,
            "reset" | "latest" => Target::Reset,
            "repeat" => Target::Repeat,
            "all" => Target::All,
            other if version::is_semver(other) => Target::Version(other.to_string()),
            other => Target::Named(other.to_string()),
        })
    }
}

impl TryFrom<String> for Target {
    type Error = MigrateError;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        token.parse()
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.as_token().to_string()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_token())
    }
}

/// One resolved step of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub version: String,
    pub action: Action,
}

impl PlannedStep {
    pub fn new(version: impl Into<String>, action: Action) -> Self {
        Self {
            version: version.into(),
            action,
        }
    }
}

/// Why a plan has nothing to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum NoopReason {
    /// The target version equals the current version
    AlreadyApplied { version: String },
    /// No outstanding or failed versions remain
    NothingOutstanding,
    /// The ledger holds nothing to revert or repeat
    NothingApplied,
}

impl fmt::Display for NoopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoopReason::AlreadyApplied { version } => {
                write!(f, "Migration already applied: {}", version)
            }
            NoopReason::NothingOutstanding => write!(f, "All migrations applied"),
            NoopReason::NothingApplied => write!(f, "No migrations applied"),
        }
    }
}

/// Ordered sequence of steps resolved from a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub target: Target,
    /// Current version when the plan was resolved
    pub current: String,
    pub steps: Vec<PlannedStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noop: Option<NoopReason>,
}

impl MigrationPlan {
    pub fn new(target: Target, current: impl Into<String>, steps: Vec<PlannedStep>) -> Self {
        Self {
            target,
            current: current.into(),
            steps,
            noop: None,
        }
    }

    pub fn noop(target: Target, current: impl Into<String>, reason: NoopReason) -> Self {
        Self {
            target,
            current: current.into(),
            steps: Vec::new(),
            noop: Some(reason),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Versions in execution order
    pub fn versions(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.version.as_str()).collect()
    }

    /// Whether the plan moves the schema backwards
    pub fn is_downgrade(&self) -> bool {
        self.steps.iter().any(|step| step.action == Action::Down)
    }
}

/// A step the engine completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedStep {
    pub version: String,
    pub action: Action,
    pub description: String,
    pub path: String,
}

/// Result of `apply`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub target: Target,
    pub dry: bool,
    /// Current version after the run
    pub current: String,
    pub steps: Vec<AppliedStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noop: Option<NoopReason>,
}

impl ApplyReport {
    /// Versions applied, in order
    pub fn versions(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.version.as_str()).collect()
    }
}
