//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use st_core::Direction;

/// Stratum - versioned, checksummed schema migrations for DuckDB
#[derive(Parser, Debug)]
#[command(name = "stratum")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override database path (`:memory:` allowed)
    #[arg(short, long, global = true, env = "STRATUM_DATABASE")]
    pub database: Option<String>,

    /// Override migrations directory
    #[arg(short, long, global = true)]
    pub migrations_dir: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending migrations or revert applied ones
    Migrate(MigrateArgs),

    /// Show the state of every migration
    Status(StatusArgs),

    /// Force-release the migration lock after a crashed run
    Unlock,
}

/// Arguments for the migrate command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Direction to migrate: "up" or "down"
    pub direction: Direction,

    /// Batch to stamp (up) or to revert (down)
    #[arg(short, long)]
    pub batch: Option<i64>,

    /// Show what would run without taking the lock or writing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip checksum validation of already-applied migrations
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: StatusOutput,
}

/// Status output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutput {
    /// Human-readable summary and table
    Table,
    /// Machine-readable JSON
    Json,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
