//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use st_core::{discover_units, Config};
use st_db::{Database, DuckDbBackend};
use st_engine::{ensure_schema, MigrationUnit, SqlUnit};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::GlobalArgs;

/// A project directory with its resolved configuration.
#[derive(Debug)]
pub(crate) struct Project {
    pub(crate) root: PathBuf,
    pub(crate) config: Config,
}

impl Project {
    /// Load the project config and apply command-line overrides.
    pub(crate) fn load(global: &GlobalArgs) -> Result<Self> {
        let root = PathBuf::from(&global.project_dir);
        let mut config = match &global.config {
            Some(path) => Config::load(Path::new(path))
                .with_context(|| format!("Failed to load config {path}"))?,
            None => Config::load_from_dir(&root).context("Failed to load project config")?,
        };

        if let Some(path) = &global.database {
            config.database.path = path.clone();
        }
        if let Some(dir) = &global.migrations_dir {
            config.migrations_dir = dir.clone();
        }
        config.validate().context("Invalid configuration")?;

        Ok(Self { root, config })
    }

    pub(crate) fn migrations_dir(&self) -> PathBuf {
        self.config.migrations_dir_absolute(&self.root)
    }

    pub(crate) fn executed_by(&self) -> String {
        self.config.resolve_executed_by()
    }

    /// Discover the project's migration files, ordered by name.
    pub(crate) fn load_units(&self) -> Result<Vec<Box<dyn MigrationUnit>>> {
        let dir = self.migrations_dir();
        let sources = discover_units(&dir)
            .with_context(|| format!("Failed to load migrations from {}", dir.display()))?;
        log::debug!("Discovered {} migrations in {}", sources.len(), dir.display());
        Ok(SqlUnit::boxed_all(sources))
    }

    /// Open the configured database and make sure the ledger and lock
    /// tables exist.
    pub(crate) async fn open_database(&self) -> Result<Arc<dyn Database>> {
        let path = self.config.database_path_absolute(&self.root);
        let db: Arc<dyn Database> =
            Arc::new(DuckDbBackend::new(&path).context("Failed to connect to database")?);
        ensure_schema(db.as_ref())
            .await
            .context("Failed to initialize migration tables")?;
        Ok(db)
    }
}

/// Calculate column widths for a table given headers and rows.
///
/// Each column width is the maximum of the header length and the
/// longest cell value in that column.
pub(crate) fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    widths
}

/// Render a left-aligned table: header row, a dash separator, then each
/// data row, with columns separated by two spaces.
pub(crate) fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let widths = calculate_column_widths(headers, rows);
    let line = |cells: Vec<String>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:<width$}", cell, width = w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(line(headers.iter().map(|h| h.to_string()).collect()));
    out.push(line(widths.iter().map(|&w| "-".repeat(w)).collect()));
    for row in rows {
        out.push(line(row.clone()));
    }
    out.join("\n")
}

pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", render_table(headers, rows));
}

/// `12ms`, or `-` when unknown
pub(crate) fn format_duration_ms(ms: Option<i64>) -> String {
    ms.map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "-".to_string())
}

/// Mean duration rounded to two decimals, or `-`
pub(crate) fn format_avg_ms(ms: Option<f64>) -> String {
    ms.map(|ms| format!("{ms:.2}ms"))
        .unwrap_or_else(|| "-".to_string())
}

/// `YYYY-MM-DD HH:MM:SS` in UTC, or `-`
pub(crate) fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
