//! Status command implementation

use anyhow::{Context, Result};
use st_engine::{status_report, StatusReport, UnitStatusRow};

use crate::cli::{GlobalArgs, StatusArgs, StatusOutput};
use crate::commands::common::{
    format_avg_ms, format_duration_ms, format_timestamp, print_table, Project,
};

/// Execute the status command
pub(crate) async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let project = Project::load(global)?;
    let units = project.load_units()?;
    let db = project.open_database().await?;

    let report = status_report(db.as_ref(), &units)
        .await
        .context("Failed to build migration status")?;

    match args.output {
        StatusOutput::Json => {
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
            println!("{json}");
        }
        StatusOutput::Table => print_status(&report),
    }
    Ok(())
}

fn print_status(report: &StatusReport) {
    if report.lock.is_locked {
        println!(
            "⚠ Migrations are locked by {} since {}",
            report.lock.locked_by.as_deref().unwrap_or("unknown"),
            format_timestamp(report.lock.locked_at)
        );
        println!("  Run `stratum unlock` if that run is no longer alive.\n");
    }

    let s = &report.summary;
    println!("Migration status");
    println!("  Total:        {}", s.total);
    println!("  Executed:     {}", s.executed);
    println!("  Pending:      {}", s.pending);
    println!("  Failed:       {}", s.failed);
    println!("  Latest batch: {}", s.latest_batch);
    println!();

    if report.units.is_empty() {
        println!("No migrations found.");
    } else {
        print_table(HEADERS, &rows(&report.units));
    }

    let failures: Vec<&UnitStatusRow> = report.failures().collect();
    if !failures.is_empty() {
        println!("\nFailed migrations:");
        for unit in failures {
            println!("  ✗ {}", unit.name);
            println!("    Failed at: {}", format_timestamp(unit.last_run_at));
            println!("    Error:     {}", unit.error.as_deref().unwrap_or("-"));
        }
    }

    let drifted: Vec<&str> = report.drifted().map(|u| u.name.as_str()).collect();
    if !drifted.is_empty() {
        println!("\nModified after execution:");
        for name in drifted {
            println!("  {name}");
        }
    }

    if !report.orphans.is_empty() {
        println!("\nRecorded but missing on disk:");
        print_table(HEADERS, &rows(&report.orphans));
    }
}

const HEADERS: &[&str] = &[
    "NAME", "STATUS", "BATCH", "DURATION", "AVG", "RUNS", "BY", "LAST RUN",
];

fn rows(units: &[UnitStatusRow]) -> Vec<Vec<String>> {
    units
        .iter()
        .map(|u| {
            let status = if u.drifted {
                format!("{} (modified)", u.state)
            } else {
                u.state.to_string()
            };
            vec![
                u.name.clone(),
                status,
                u.batch.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string()),
                format_duration_ms(u.duration_ms),
                format_avg_ms(u.avg_duration_ms),
                u.execution_count.to_string(),
                u.executed_by.clone().unwrap_or_else(|| "-".to_string()),
                format_timestamp(u.last_run_at),
            ]
        })
        .collect()
}
