use anyhow::{Context as _, Result};
use console::style;
use inquire::Confirm;
use kvmigrate::{Action, ApplyReport, MigrateError, MigrationPlan, Target};

use super::Context;

const PRODUCTION_WARNING: &str = "WARNING: DANGEROUS: You are working on a production database!";

/// Plan, confirm and apply a movement target
pub async fn run(ctx: &Context, target: Target) -> Result<()> {
    let plan = ctx.engine.plan(&target, &ctx.params).await?;

    if let Some(reason) = &plan.noop {
        println!("{}", reason);
        return Ok(());
    }

    if !confirm(ctx, &plan)? {
        println!("Exiting");
        return Ok(());
    }

    match ctx.engine.apply(&target, &ctx.params).await {
        Ok(report) => {
            print!("{}", format_report(&report));
            Ok(())
        }
        Err(err @ MigrateError::Execution { .. }) => {
            for version in err.applied() {
                println!("Applied {}", version);
            }
            Err(err).context("Migration failed")
        }
        Err(err) => Err(err.into()),
    }
}

/// The word describing what a plan does
pub fn plan_action(plan: &MigrationPlan) -> &'static str {
    if plan.is_downgrade() {
        "downgrade"
    } else if plan.steps.iter().any(|step| step.action == Action::Reset) {
        "reset"
    } else if plan.steps.iter().all(|step| step.action == Action::Named) {
        "run"
    } else {
        "upgrade"
    }
}

/// Summary shown before asking for confirmation
pub fn describe_plan(plan: &MigrationPlan, profile: &str, dry: bool) -> String {
    let action = plan_action(plan);
    let count = plan.steps.len();
    let noun = if count > 1 { "changes" } else { "change" };
    let target = plan.versions().last().copied().unwrap_or(plan.current.as_str());

    let mut out = if dry {
        format!("Dry Run: {} {} {} to version {}.\n", action, count, noun, target)
    } else {
        format!(
            "Confirm {} {} {} to version {} on {}.\n",
            count, action, noun, target, profile
        )
    };

    out.push_str(&format!(
        "\nMigrations to {}:\n",
        if plan.is_downgrade() { "revert" } else { "apply" }
    ));
    for step in &plan.steps {
        if step.action == Action::Up || step.action == Action::Down {
            out.push_str(&format!("{}\n", step.version));
        } else {
            out.push_str(&format!("{} ({})\n", step.version, step.action));
        }
    }
    out
}

/// Lines printed after a successful run
pub fn format_report(report: &ApplyReport) -> String {
    let prefix = if report.dry { "Dry Run: " } else { "" };
    let mut out = String::new();
    for step in &report.steps {
        out.push_str(&format!(
            "{}{} \"{} - {}\"\n",
            prefix,
            step.action.verb(),
            step.version,
            step.description
        ));
    }
    out.push_str(&format!("Current version: {}\n", report.current));
    out
}

fn confirm(ctx: &Context, plan: &MigrationPlan) -> Result<bool> {
    if ctx.force {
        return Ok(true);
    }

    if ctx.settings.is_production() {
        println!("\n{}", style(PRODUCTION_WARNING).red().bold());
    }
    println!("{}", describe_plan(plan, ctx.profile(), ctx.params.dry));

    // Dry runs change nothing and need no confirmation
    if ctx.params.dry {
        return Ok(true);
    }

    Confirm::new("Apply these migrations?")
        .with_default(false)
        .prompt()
        .context("Failed to get confirmation")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvmigrate::{AppliedStep, PlannedStep};

    fn plan(steps: &[(&str, Action)]) -> MigrationPlan {
        MigrationPlan::new(
            Target::All,
            "1.0.0",
            steps
                .iter()
                .map(|(version, action)| PlannedStep::new(*version, *action))
                .collect(),
        )
    }

    #[test]
    fn test_describe_upgrade() {
        let plan = plan(&[("1.1.0", Action::Up), ("2.0.0", Action::Up)]);
        assert_eq!(plan_action(&plan), "upgrade");
        assert_eq!(
            describe_plan(&plan, "dev", false),
            "Confirm 2 upgrade changes to version 2.0.0 on dev.\n\nMigrations to apply:\n1.1.0\n2.0.0\n"
        );
    }

    #[test]
    fn test_describe_downgrade_dry_run() {
        let plan = plan(&[("2.0.0", Action::Down)]);
        assert_eq!(plan_action(&plan), "downgrade");
        let text = describe_plan(&plan, "prod", true);
        assert!(text.starts_with("Dry Run: downgrade 1 change to version 2.0.0."));
        assert!(text.contains("Migrations to revert:\n2.0.0\n"));
    }

    #[test]
    fn test_describe_marks_special_actions() {
        let plan = plan(&[("1.1.0", Action::Retry), ("2.0.0", Action::Up)]);
        let text = describe_plan(&plan, "dev", false);
        assert!(text.contains("1.1.0 (retry)\n2.0.0\n"));

        assert_eq!(plan_action(&self::plan(&[("latest", Action::Reset)])), "reset");
        assert_eq!(plan_action(&self::plan(&[("seed", Action::Named)])), "run");
    }

    #[test]
    fn test_format_report() {
        let report = ApplyReport {
            target: Target::Up,
            dry: false,
            current: "1.1.0".to_string(),
            steps: vec![AppliedStep {
                version: "1.1.0".to_string(),
                action: Action::Up,
                description: "Add roles".to_string(),
                path: "migrations/1.1.0.json".to_string(),
            }],
            noop: None,
        };
        assert_eq!(
            format_report(&report),
            "Upgrade to \"1.1.0 - Add roles\"\nCurrent version: 1.1.0\n"
        );
    }
}
