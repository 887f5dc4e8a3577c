//! Resolves a movement target into an ordered plan of steps

use std::cmp::Ordering;

use crate::definitions::{
    Action, ApplyParams, MigrationPlan, NoopReason, PlannedStep, Target,
};
use crate::error::{MigrateError, MigrateResult};
use crate::resolver::VersionResolver;
use crate::version::{self, ZERO_VERSION};

/// Resolve `target` against a snapshot.
///
/// `reset_unit` names the catalog unit that `reset` runs when present.
pub fn plan(
    resolver: &VersionResolver,
    target: &Target,
    params: &ApplyParams,
    reset_unit: &str,
) -> MigrateResult<MigrationPlan> {
    let current = resolver.current_version();

    let plan = match target {
        Target::Reset => plan_reset(resolver, target, &current, reset_unit),
        Target::Repeat => match resolver.versioned_records().pop() {
            Some(record) => MigrationPlan::new(
                target.clone(),
                &current,
                vec![PlannedStep::new(record.version, Action::Repeat)],
            ),
            None => MigrationPlan::noop(target.clone(), &current, NoopReason::NothingApplied),
        },
        Target::Up | Target::All => {
            let mut steps = retry_steps(resolver, params);
            let limit = if *target == Target::Up { Some(1) } else { None };
            steps.extend(
                resolver
                    .outstanding_versions(limit)
                    .into_iter()
                    .map(|version| PlannedStep::new(version, Action::Up)),
            );
            if steps.is_empty() {
                MigrationPlan::noop(target.clone(), &current, NoopReason::NothingOutstanding)
            } else {
                MigrationPlan::new(target.clone(), &current, steps)
            }
        }
        Target::Down => match resolver.versioned_records().pop() {
            Some(record) => MigrationPlan::new(
                target.clone(),
                &current,
                vec![PlannedStep::new(record.version, Action::Down)],
            ),
            None => MigrationPlan::noop(target.clone(), &current, NoopReason::NothingApplied),
        },
        Target::Version(wanted) => plan_version(resolver, target, wanted, &current)?,
        Target::Named(name) => {
            if resolver.find_entry(name).is_none() || version::is_semver(name) {
                return Err(MigrateError::target_not_found(
                    name,
                    "not in named migrations",
                ));
            }
            MigrationPlan::new(
                target.clone(),
                &current,
                vec![PlannedStep::new(name.clone(), Action::Named)],
            )
        }
    };

    tracing::debug!(
        mode = %target,
        current = %plan.current,
        steps = plan.steps.len(),
        "resolved migration plan"
    );
    Ok(plan)
}

fn retry_steps(resolver: &VersionResolver, params: &ApplyParams) -> Vec<PlannedStep> {
    if !params.retry_failed {
        return Vec::new();
    }
    resolver
        .failed_tail()
        .into_iter()
        .map(|record| PlannedStep::new(record.version, Action::Retry))
        .collect()
}

fn plan_reset(
    resolver: &VersionResolver,
    target: &Target,
    current: &str,
    reset_unit: &str,
) -> MigrationPlan {
    if resolver.find_entry(reset_unit).is_some() {
        return MigrationPlan::new(
            target.clone(),
            current,
            vec![PlannedStep::new(reset_unit, Action::Reset)],
        );
    }

    // Without a reset unit every catalog version is replayed from an empty ledger
    let steps: Vec<PlannedStep> = VersionResolver::with_empty_ledger(resolver.catalog().to_vec())
        .outstanding_versions(None)
        .into_iter()
        .map(|version| PlannedStep::new(version, Action::Reset))
        .collect();

    if steps.is_empty() {
        MigrationPlan::noop(target.clone(), current, NoopReason::NothingOutstanding)
    } else {
        MigrationPlan::new(target.clone(), current, steps)
    }
}

fn plan_version(
    resolver: &VersionResolver,
    target: &Target,
    wanted: &str,
    current: &str,
) -> MigrateResult<MigrationPlan> {
    let ordering = version::compare(wanted, current)
        .ok_or_else(|| MigrateError::target_not_found(wanted, "not a semantic version"))?;

    match ordering {
        Ordering::Equal => Ok(MigrationPlan::noop(
            target.clone(),
            current,
            NoopReason::AlreadyApplied {
                version: current.to_string(),
            },
        )),
        Ordering::Less => {
            let is_zero = version::compare(wanted, ZERO_VERSION) == Some(Ordering::Equal);
            if !is_zero && !resolver.is_recorded(wanted) {
                return Err(MigrateError::target_not_found(
                    wanted,
                    "not in applied migrations",
                ));
            }
            let steps: Vec<PlannedStep> = resolver
                .versioned_records()
                .into_iter()
                .rev()
                .filter(|record| {
                    version::compare(&record.version, wanted) == Some(Ordering::Greater)
                })
                .map(|record| PlannedStep::new(record.version, Action::Down))
                .collect();
            Ok(MigrationPlan::new(target.clone(), current, steps))
        }
        Ordering::Greater => {
            let outstanding = resolver.outstanding_versions(None);
            let found = outstanding
                .iter()
                .any(|version| version::compare(version, wanted) == Some(Ordering::Equal));
            if !found {
                return Err(MigrateError::target_not_found(
                    wanted,
                    "not in outstanding migrations",
                ));
            }
            let steps: Vec<PlannedStep> = outstanding
                .into_iter()
                .take_while(|version| {
                    version::compare(version, wanted) != Some(Ordering::Greater)
                })
                .map(|version| PlannedStep::new(version, Action::Up))
                .collect();
            Ok(MigrationPlan::new(target.clone(), current, steps))
        }
    }
}
