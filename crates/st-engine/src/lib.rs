//! Migration engine for Stratum.
//!
//! Applies and reverts ordered migration units against a [`st_db::Database`],
//! recording every attempt in an append-only history ledger, guarding runs
//! with a durable singleton lock, and refusing to touch units whose text has
//! drifted from the checksum recorded when they were applied.
//!
//! - [`schema`]: ledger and lock table DDL
//! - [`ledger`]: append-only execution history and derived state
//! - [`lock`]: compare-and-swap run lock
//! - [`checksum`]: drift detection against the ledger
//! - [`unit`]: the [`MigrationUnit`] trait and SQL-file units
//! - [`runner`]: the batch state machine
//! - [`status`]: read-only status report

pub mod checksum;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod runner;
pub mod schema;
pub mod status;
pub mod unit;

pub use checksum::ChecksumValidator;
pub use error::{EngineError, EngineResult};
pub use ledger::{DetailedStatus, Ledger, LedgerEntry, LedgerRecord, LedgerStatus};
pub use lock::{LockManager, LockState};
pub use runner::{
    BatchRunner, PlannedUnit, RunOptions, RunOutcome, RunPhase, RunReport, UnitOutcome,
};
pub use schema::ensure_schema;
pub use status::{status_report, StatusReport, StatusSummary, UnitState, UnitStatusRow};
pub use unit::{MigrationUnit, SqlUnit};
