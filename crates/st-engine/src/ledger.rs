//! Append-only execution history.
//!
//! Every apply, revert or failed attempt appends one row to
//! `stratum_migration_history`; rows are never updated or deleted. The
//! current state of a unit is its latest row, ranked per name by
//! `("timestamp", seq)` descending.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use st_core::config::FALLBACK_IDENTITY;
use st_db::{Database, Row, SqlValue};
use std::fmt;
use std::str::FromStr;

/// Outcome recorded for one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Applied,
    Reverted,
    Error,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Applied => "applied",
            LedgerStatus::Reverted => "reverted",
            LedgerStatus::Error => "error",
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "applied" => Ok(LedgerStatus::Applied),
            "reverted" => Ok(LedgerStatus::Reverted),
            "error" => Ok(LedgerStatus::Error),
            other => Err(EngineError::CorruptLedger(format!(
                "unknown status '{other}'"
            ))),
        }
    }
}

/// One row of the history ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub batch: i64,
    pub status: LedgerStatus,
    /// `None` for legacy rows written before checksums were recorded
    pub checksum: Option<String>,
    pub executed_by: Option<String>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Insertion order; breaks timestamp ties
    pub seq: i64,
}

/// Column list matching [`LedgerEntry::from_row`].
const ENTRY_COLUMNS: &str = r#"id, name, "timestamp", batch, status, checksum, executed_by, duration_ms, error, created_at, updated_at, seq"#;

impl LedgerEntry {
    fn from_row(row: &Row) -> EngineResult<Self> {
        Ok(Self {
            id: row.get_string(0)?,
            name: row.get_string(1)?,
            timestamp: row.get_timestamp(2)?,
            batch: row.get_i64(3)?,
            status: row.get_string(4)?.parse()?,
            checksum: row.get_opt_string(5)?,
            executed_by: row.get_opt_string(6)?,
            duration_ms: row.get_opt_i64(7)?,
            error: row.get_opt_string(8)?,
            created_at: row.get_timestamp(9)?,
            updated_at: row.get_timestamp(10)?,
            seq: row.get_i64(11)?,
        })
    }
}

/// Latest entry for one unit plus aggregates over its whole history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedStatus {
    pub name: String,
    pub status: LedgerStatus,
    pub batch: i64,
    pub timestamp: DateTime<Utc>,
    pub checksum: Option<String>,
    pub executed_by: Option<String>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    /// All attempts for this name, whatever their status
    pub execution_count: i64,
    /// Mean duration of `applied` attempts only
    pub avg_duration_ms: Option<f64>,
}

/// A new ledger entry to append.
#[derive(Debug, Clone, Copy)]
pub struct LedgerRecord<'a> {
    pub name: &'a str,
    pub batch: i64,
    pub status: LedgerStatus,
    pub checksum: Option<&'a str>,
    pub duration_ms: i64,
    pub error: Option<&'a str>,
}

const LATEST_BATCH_SQL: &str = "SELECT COALESCE(MAX(batch), 0)
     FROM stratum_migration_history
     WHERE status = 'applied'";

const CURRENTLY_APPLIED_SQL: &str = r#"
WITH ranked AS (
    SELECT name, status, "timestamp", seq,
           ROW_NUMBER() OVER (PARTITION BY name ORDER BY "timestamp" DESC, seq DESC) AS rn
    FROM stratum_migration_history
)
SELECT name
FROM ranked
WHERE rn = 1 AND status = 'applied'
ORDER BY "timestamp" ASC, seq ASC
"#;

const MEMBERS_OF_BATCH_SQL: &str = r#"
WITH ranked AS (
    SELECT name, status, batch, "timestamp", seq,
           ROW_NUMBER() OVER (PARTITION BY name ORDER BY "timestamp" DESC, seq DESC) AS rn
    FROM stratum_migration_history
)
SELECT name
FROM ranked
WHERE rn = 1 AND status = 'applied' AND batch = ?
ORDER BY "timestamp" ASC, seq ASC
"#;

const DETAILED_STATUS_SQL: &str = r#"
WITH ranked AS (
    SELECT name, status, batch, "timestamp", seq, checksum, executed_by, duration_ms, error,
           ROW_NUMBER() OVER (PARTITION BY name ORDER BY "timestamp" DESC, seq DESC) AS rn
    FROM stratum_migration_history
)
SELECT
    rm.name,
    rm.status,
    rm.batch,
    rm."timestamp",
    rm.checksum,
    rm.executed_by,
    rm.duration_ms,
    rm.error,
    (
        SELECT COUNT(*)
        FROM stratum_migration_history mh
        WHERE mh.name = rm.name
    ) AS execution_count,
    (
        SELECT AVG(mh.duration_ms)
        FROM stratum_migration_history mh
        WHERE mh.name = rm.name AND mh.status = 'applied'
    ) AS avg_duration_ms
FROM ranked rm
WHERE rn = 1
ORDER BY rm."timestamp" DESC, rm.seq DESC
"#;

const INSERT_SQL: &str = r#"
INSERT INTO stratum_migration_history
    (id, name, "timestamp", batch, status, checksum, executed_by, duration_ms, error, created_at, updated_at)
VALUES
    (?, ?, CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))
"#;

/// Read and append access to the history ledger.
pub struct Ledger<'a> {
    db: &'a dyn Database,
    executed_by: String,
}

impl<'a> Ledger<'a> {
    /// Ledger over `db`, stamping new entries as `system`.
    pub fn new(db: &'a dyn Database) -> Self {
        Self {
            db,
            executed_by: FALLBACK_IDENTITY.to_string(),
        }
    }

    /// Set the identity stamped on appended entries.
    pub fn with_executed_by(mut self, identity: impl Into<String>) -> Self {
        self.executed_by = identity.into();
        self
    }

    pub fn executed_by(&self) -> &str {
        &self.executed_by
    }

    /// Highest batch among `applied` entries, or 0 when nothing was applied.
    pub async fn latest_batch_number(&self) -> EngineResult<i64> {
        let rows = self.db.query(LATEST_BATCH_SQL, &[]).await?;
        match rows.first() {
            Some(row) => Ok(row.get_i64(0)?),
            None => Ok(0),
        }
    }

    /// Names whose latest entry is `applied`, in application order.
    pub async fn currently_applied(&self) -> EngineResult<Vec<String>> {
        let rows = self.db.query(CURRENTLY_APPLIED_SQL, &[]).await?;
        names(&rows)
    }

    /// Names whose latest entry is `applied` in `batch`, in application order.
    pub async fn members_of_batch(&self, batch: i64) -> EngineResult<Vec<String>> {
        let rows = self
            .db
            .query(MEMBERS_OF_BATCH_SQL, &[SqlValue::Int(batch)])
            .await?;
        names(&rows)
    }

    /// Latest entry per unit with execution count and mean apply duration,
    /// most recently touched first.
    pub async fn detailed_status(&self) -> EngineResult<Vec<DetailedStatus>> {
        let rows = self.db.query(DETAILED_STATUS_SQL, &[]).await?;
        rows.iter()
            .map(|row| -> EngineResult<DetailedStatus> {
                Ok(DetailedStatus {
                    name: row.get_string(0)?,
                    status: row.get_string(1)?.parse()?,
                    batch: row.get_i64(2)?,
                    timestamp: row.get_timestamp(3)?,
                    checksum: row.get_opt_string(4)?,
                    executed_by: row.get_opt_string(5)?,
                    duration_ms: row.get_opt_i64(6)?,
                    error: row.get_opt_string(7)?,
                    execution_count: row.get_i64(8)?,
                    avg_duration_ms: row.get_opt_f64(9)?,
                })
            })
            .collect()
    }

    /// Most recent entry for `name`, if the unit was ever executed.
    pub async fn latest_entry(&self, name: &str) -> EngineResult<Option<LedgerEntry>> {
        let sql = format!(
            r#"SELECT {ENTRY_COLUMNS}
               FROM stratum_migration_history
               WHERE name = ?
               ORDER BY "timestamp" DESC, seq DESC
               LIMIT 1"#
        );
        let rows = self.db.query(&sql, &[name.into()]).await?;
        rows.first().map(LedgerEntry::from_row).transpose()
    }

    /// Full history of `name`, oldest first.
    pub async fn entries(&self, name: &str) -> EngineResult<Vec<LedgerEntry>> {
        let sql = format!(
            r#"SELECT {ENTRY_COLUMNS}
               FROM stratum_migration_history
               WHERE name = ?
               ORDER BY "timestamp" ASC, seq ASC"#
        );
        let rows = self.db.query(&sql, &[name.into()]).await?;
        rows.iter().map(LedgerEntry::from_row).collect()
    }

    /// Append one entry. Never touches existing rows.
    pub async fn record(&self, record: &LedgerRecord<'_>) -> EngineResult<()> {
        if record.batch < 1 {
            return Err(EngineError::InvalidBatch {
                batch: record.batch,
            });
        }
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        self.db
            .execute(
                INSERT_SQL,
                &[
                    id.into(),
                    record.name.into(),
                    now.into(),
                    record.batch.into(),
                    record.status.as_str().into(),
                    record.checksum.into(),
                    self.executed_by.as_str().into(),
                    record.duration_ms.into(),
                    record.error.into(),
                    now.into(),
                    now.into(),
                ],
            )
            .await?;
        log::debug!(
            "Recorded {} for {} (batch {})",
            record.status,
            record.name,
            record.batch
        );
        Ok(())
    }
}

fn names(rows: &[Row]) -> EngineResult<Vec<String>> {
    rows.iter()
        .map(|row| row.get_string(0).map_err(EngineError::from))
        .collect()
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
