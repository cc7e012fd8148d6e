//! Migrate command implementation

use anyhow::{Context, Result};
use st_core::Direction;
use st_engine::{BatchRunner, EngineError, RunOptions, RunOutcome, RunReport};

use crate::cli::{GlobalArgs, MigrateArgs};
use crate::commands::common::Project;

/// Execute the migrate command
pub(crate) async fn execute(args: &MigrateArgs, global: &GlobalArgs) -> Result<()> {
    let project = Project::load(global)?;
    let units = project.load_units()?;
    let db = project.open_database().await?;

    let options = RunOptions {
        direction: args.direction,
        batch: args.batch,
        dry_run: args.dry_run,
        verbose: global.verbose,
        force: args.force,
    };

    let mut runner = BatchRunner::new(db.as_ref(), &units)
        .with_executed_by(project.executed_by())
        .with_audit_failures(project.config.audit_failures);

    match runner.run(&options).await {
        Ok(report) => {
            print_report(&report, global.verbose);
            Ok(())
        }
        Err(err) => {
            if let EngineError::UnitExecutionFailed { name, cause, .. } = &err {
                println!("  ✗ {name} - {cause}");
            }
            log::debug!("Run stopped in phase {}", runner.phase());
            Err(err).with_context(|| format!("Migration {} failed", args.direction))
        }
    }
}

fn print_report(report: &RunReport, verbose: bool) {
    let (verb, done) = match report.direction {
        Direction::Up => ("apply", "applied"),
        Direction::Down => ("revert", "reverted"),
    };

    match &report.outcome {
        RunOutcome::NoPendingUnits => {
            println!("No migrations to {verb}.");
        }
        RunOutcome::DryRun { planned } => {
            println!("Dry run: would {verb} {} migrations\n", planned.len());
            for unit in planned {
                println!("  {} (batch {})", unit.name, unit.batch);
            }
        }
        RunOutcome::Completed { units } => {
            for unit in units {
                if verbose {
                    println!("  ✓ {} [{}ms]", unit.name, unit.duration_ms);
                } else {
                    println!("  ✓ {}", unit.name);
                }
            }
            println!();
            println!("Migrations {done} successfully ({} total).", units.len());
        }
    }
}
