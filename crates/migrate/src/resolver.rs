//! Version Resolver - derives resolution state from a ledger and a catalog
//!
//! A resolver is built from one ledger read and one catalog scan and answers
//! every query from that snapshot.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::definitions::{CatalogEntry, MigrationRecord};
use crate::version::{self, ZERO_VERSION};

/// Snapshot of the ledger and catalog
#[derive(Debug, Clone, Default)]
pub struct VersionResolver {
    records: Vec<MigrationRecord>,
    catalog: Vec<CatalogEntry>,
}

impl VersionResolver {
    pub fn new(records: Vec<MigrationRecord>, catalog: Vec<CatalogEntry>) -> Self {
        Self { records, catalog }
    }

    /// Resolver over an empty ledger
    pub fn with_empty_ledger(catalog: Vec<CatalogEntry>) -> Self {
        Self::new(Vec::new(), catalog)
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    /// Highest semver among non-failed records, or `0.0.0`
    pub fn current_version(&self) -> String {
        self.records
            .iter()
            .filter(|record| !record.is_failed() && record.is_semver())
            .map(|record| record.version.as_str())
            .max_by(|a, b| version::compare(a, b).unwrap_or(Ordering::Equal))
            .unwrap_or(ZERO_VERSION)
            .to_string()
    }

    /// Catalog versions newer than current that have no ledger record
    pub fn outstanding_versions(&self, limit: Option<usize>) -> Vec<String> {
        let current = self.current_version();
        let recorded: HashSet<&str> = self
            .records
            .iter()
            .map(|record| record.version.as_str())
            .collect();

        let mut seen = HashSet::new();
        let candidates = self
            .catalog
            .iter()
            .filter(|entry| entry.is_semver())
            .filter(|entry| version::compare(&entry.id, &current) == Some(Ordering::Greater))
            .filter(|entry| !recorded.contains(entry.id.as_str()))
            .filter(|entry| seen.insert(entry.id.clone()))
            .map(|entry| entry.id.clone());

        let mut outstanding = version::sort_semver(candidates);
        if let Some(limit) = limit {
            outstanding.truncate(limit);
        }
        outstanding
    }

    /// Catalog identifiers that are not semantic versions
    pub fn named_migrations(&self) -> Vec<String> {
        self.catalog
            .iter()
            .filter(|entry| !entry.is_semver())
            .map(|entry| entry.id.clone())
            .collect()
    }

    /// Ledger sorted by (semver, order); named records follow in ledger order
    pub fn past_migrations(&self) -> Vec<MigrationRecord> {
        let (mut versioned, named): (Vec<MigrationRecord>, Vec<MigrationRecord>) = self
            .records
            .iter()
            .cloned()
            .partition(|record| record.is_semver());

        versioned.sort_by(compare_records);
        versioned.extend(named);
        versioned
    }

    /// Semver records in ledger order, oldest first
    pub fn versioned_records(&self) -> Vec<MigrationRecord> {
        let mut versioned: Vec<MigrationRecord> = self
            .records
            .iter()
            .filter(|record| record.is_semver())
            .cloned()
            .collect();
        versioned.sort_by(compare_records);
        versioned
    }

    /// Trailing run of failed semver records, oldest first
    pub fn failed_tail(&self) -> Vec<MigrationRecord> {
        let mut tail: Vec<MigrationRecord> = self
            .versioned_records()
            .into_iter()
            .rev()
            .take_while(|record| record.is_failed())
            .collect();
        tail.reverse();
        tail
    }

    /// Whether any ledger record carries this version
    pub fn is_recorded(&self, id: &str) -> bool {
        self.find_record(id).is_some()
    }

    /// Ledger record for a version; semver identifiers match by precedence
    pub fn find_record(&self, id: &str) -> Option<&MigrationRecord> {
        if version::is_semver(id) {
            self.records
                .iter()
                .find(|record| version::compare(&record.version, id) == Some(Ordering::Equal))
        } else {
            self.records.iter().find(|record| record.version == id)
        }
    }

    /// Catalog entry for an identifier
    pub fn find_entry(&self, id: &str) -> Option<&CatalogEntry> {
        self.catalog.iter().find(|entry| entry.id == id)
    }

    /// Highest semver in the catalog
    pub fn latest_catalog_version(&self) -> Option<String> {
        self.catalog
            .iter()
            .filter(|entry| entry.is_semver())
            .map(|entry| entry.id.as_str())
            .max_by(|a, b| version::compare(a, b).unwrap_or(Ordering::Equal))
            .map(str::to_string)
    }
}

fn compare_records(a: &MigrationRecord, b: &MigrationRecord) -> Ordering {
    version::compare(&a.version, &b.version)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.order.unwrap_or(0).cmp(&b.order.unwrap_or(0)))
}
