//! Error types for the migration engine.

use st_db::DbError;
use thiserror::Error;

/// Migration engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Another process holds the migration lock (M001).
    #[error("[M001] Migrations already running (lock held by {holder})")]
    LockDenied { holder: String },

    /// A unit's text no longer matches the checksum recorded when it was applied (M002).
    #[error("[M002] Migration '{name}' was modified after execution (use --force to bypass)")]
    ChecksumMismatch { name: String },

    /// A unit's apply or revert operation failed (M003).
    #[error("[M003] Migration '{name}' failed: {cause}")]
    UnitExecutionFailed {
        name: String,
        cause: String,
        #[source]
        source: DbError,
    },

    /// The ledger references a unit that is not in the discovered set (M004).
    #[error("[M004] Migration '{name}' is recorded as applied but was not found on disk")]
    UnknownUnit { name: String },

    /// The same unit name was supplied twice (M005).
    #[error("[M005] Duplicate migration name '{name}'")]
    DuplicateUnit { name: String },

    /// Explicit batch numbers start at 1 (M006).
    #[error("[M006] Invalid batch number {batch}: batches start at 1")]
    InvalidBatch { batch: i64 },

    /// Ledger row could not be interpreted (M007).
    #[error("[M007] Corrupt ledger entry: {0}")]
    CorruptLedger(String),

    /// Ledger or lock tables could not be created (M008).
    #[error("[M008] Failed to initialize migration tables: {0}")]
    SchemaInit(#[source] DbError),

    /// Database error with preserved source chain (M009).
    #[error("[M009] Database error: {0}")]
    Database(#[from] DbError),
}

/// Result type alias for [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;
