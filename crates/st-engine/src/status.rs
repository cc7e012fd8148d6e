//! Read-only status report joining discovered units with the ledger.

use crate::error::EngineResult;
use crate::ledger::{DetailedStatus, Ledger, LedgerStatus};
use crate::lock::{LockManager, LockState};
use crate::unit::MigrationUnit;
use chrono::{DateTime, Utc};
use serde::Serialize;
use st_db::Database;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// State of a unit as shown in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Applied,
    Reverted,
    Error,
    /// Never executed
    Pending,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Applied => "applied",
            UnitState::Reverted => "reverted",
            UnitState::Error => "error",
            UnitState::Pending => "pending",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<LedgerStatus> for UnitState {
    fn from(status: LedgerStatus) -> Self {
        match status {
            LedgerStatus::Applied => UnitState::Applied,
            LedgerStatus::Reverted => UnitState::Reverted,
            LedgerStatus::Error => UnitState::Error,
        }
    }
}

/// One line of the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitStatusRow {
    pub name: String,
    pub state: UnitState,
    pub batch: Option<i64>,
    /// Duration of the latest attempt
    pub duration_ms: Option<i64>,
    /// Mean duration over successful applies
    pub avg_duration_ms: Option<f64>,
    pub execution_count: i64,
    pub executed_by: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Applied, but the unit text no longer matches the recorded checksum
    pub drifted: bool,
    pub error: Option<String>,
}

impl UnitStatusRow {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: UnitState::Pending,
            batch: None,
            duration_ms: None,
            avg_duration_ms: None,
            execution_count: 0,
            executed_by: None,
            last_run_at: None,
            drifted: false,
            error: None,
        }
    }

    fn from_detail(detail: DetailedStatus, current_checksum: Option<&str>) -> Self {
        let drifted = detail.status == LedgerStatus::Applied
            && matches!(
                (detail.checksum.as_deref(), current_checksum),
                (Some(recorded), Some(current)) if recorded != current
            );
        Self {
            name: detail.name,
            state: detail.status.into(),
            batch: Some(detail.batch),
            duration_ms: detail.duration_ms,
            avg_duration_ms: detail.avg_duration_ms,
            execution_count: detail.execution_count,
            executed_by: detail.executed_by,
            last_run_at: Some(detail.timestamp),
            drifted,
            error: detail.error,
        }
    }
}

/// Headline counts over the discovered units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub executed: usize,
    pub pending: usize,
    pub failed: usize,
    pub latest_batch: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub summary: StatusSummary,
    /// Discovered units in name order
    pub units: Vec<UnitStatusRow>,
    /// Ledger history for units that are no longer discovered
    pub orphans: Vec<UnitStatusRow>,
    pub lock: LockState,
}

impl StatusReport {
    /// Discovered units whose latest attempt failed
    pub fn failures(&self) -> impl Iterator<Item = &UnitStatusRow> {
        self.units.iter().filter(|u| u.state == UnitState::Error)
    }

    /// Discovered units applied with text that has since changed
    pub fn drifted(&self) -> impl Iterator<Item = &UnitStatusRow> {
        self.units.iter().filter(|u| u.drifted)
    }
}

/// Build the status report. Reads only.
pub async fn status_report(
    db: &dyn Database,
    units: &[Box<dyn MigrationUnit>],
) -> EngineResult<StatusReport> {
    let ledger = Ledger::new(db);
    let mut details: HashMap<String, DetailedStatus> = ledger
        .detailed_status()
        .await?
        .into_iter()
        .map(|d| (d.name.clone(), d))
        .collect();

    let mut sorted: Vec<&dyn MigrationUnit> = units.iter().map(|u| u.as_ref()).collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()));

    let mut seen = HashSet::with_capacity(sorted.len());
    let mut rows = Vec::with_capacity(sorted.len());
    for unit in sorted {
        let name = unit.name().as_str();
        if !seen.insert(name) {
            continue;
        }
        let row = match details.remove(name) {
            Some(detail) => UnitStatusRow::from_detail(detail, Some(&unit.checksum())),
            None => UnitStatusRow::pending(name),
        };
        rows.push(row);
    }

    let mut orphans: Vec<UnitStatusRow> = details
        .into_values()
        .map(|d| UnitStatusRow::from_detail(d, None))
        .collect();
    orphans.sort_by(|a, b| a.name.cmp(&b.name));

    let total = rows.len();
    let executed = rows
        .iter()
        .filter(|r| r.state == UnitState::Applied)
        .count();
    let failed = rows.iter().filter(|r| r.state == UnitState::Error).count();
    let summary = StatusSummary {
        total,
        executed,
        pending: total - executed,
        failed,
        latest_batch: ledger.latest_batch_number().await?,
    };

    let lock = LockManager::new(db).state().await?;

    Ok(StatusReport {
        summary,
        units: rows,
        orphans,
        lock,
    })
}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;
