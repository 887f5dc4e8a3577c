use anyhow::Result;
use kvmigrate::{MigrationRecord, MigrationStatus};

use super::Context;

const DATE_FORMAT: &str = "%H:%M:%S %b %-d, %Y";

pub async fn status(ctx: &Context) -> Result<()> {
    println!("{}", ctx.engine.get_current_version().await?);
    Ok(())
}

pub async fn list(ctx: &Context) -> Result<()> {
    let records = ctx.engine.get_past_migrations().await?;
    print!("{}", format_records(&records));
    Ok(())
}

pub async fn outstanding(ctx: &Context) -> Result<()> {
    let versions = ctx.engine.get_outstanding_versions(None).await?;
    print!("{}", format_lines(&versions));
    Ok(())
}

pub async fn named(ctx: &Context) -> Result<()> {
    let names = ctx.engine.get_named_migrations().await?;
    print!("{}", format_lines(&names));
    Ok(())
}

/// One identifier per line, or `none`
pub fn format_lines(ids: &[String]) -> String {
    if ids.is_empty() {
        return "none\n".to_string();
    }
    ids.iter().map(|id| format!("{}\n", id)).collect()
}

/// Table of applied migrations
pub fn format_records(records: &[MigrationRecord]) -> String {
    if records.is_empty() {
        return "\nNo migrations applied\n".to_string();
    }

    let width = records
        .iter()
        .map(|record| record.version.len())
        .max()
        .unwrap_or(0)
        .max("Version".len());

    let mut out = format!(
        "\n{:<22}  {:<width$}  {:<7}  Description\n",
        "Date",
        "Version",
        "Status",
        width = width
    );
    for record in records {
        let status = match record.status {
            MigrationStatus::Success => "ok",
            MigrationStatus::Failed => "FAILED",
        };
        out.push_str(&format!(
            "{:<22}  {:<width$}  {:<7}  {}\n",
            record.date.format(DATE_FORMAT).to_string(),
            record.version,
            status,
            record.description,
            width = width
        ));
    }
    out
}
