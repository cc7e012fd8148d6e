//! Durable run lock.
//!
//! A single row in `stratum_migration_lock` guards migration runs across
//! processes. Acquisition is a conditional update that succeeds only when the
//! row is unlocked; a denied acquisition returns immediately and is never
//! retried here.

use crate::error::{EngineError, EngineResult};
use crate::schema::LOCK_ROW_ID;
use chrono::{DateTime, Utc};
use serde::Serialize;
use st_db::{Database, ErrorCode, SqlValue};

const ACQUIRE_SQL: &str = "UPDATE stratum_migration_lock
     SET is_locked = true,
         locked_at = CAST(? AS TIMESTAMP),
         locked_by = ?
     WHERE id = ? AND is_locked = false";

const RELEASE_SQL: &str = "UPDATE stratum_migration_lock
     SET is_locked = false,
         locked_at = NULL,
         locked_by = NULL
     WHERE id = ?";

const STATE_SQL: &str = "SELECT is_locked, locked_at, locked_by
     FROM stratum_migration_lock
     WHERE id = ?";

/// Snapshot of the lock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockState {
    pub is_locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
}

/// Compare-and-swap access to the lock row.
pub struct LockManager<'a> {
    db: &'a dyn Database,
}

impl<'a> LockManager<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    /// Try to take the lock for `identity`.
    ///
    /// Returns `false` when the lock is already held, including when a
    /// concurrent acquisition commits first and this update loses the write
    /// conflict; nothing is written in either case.
    pub async fn acquire(&self, identity: &str) -> EngineResult<bool> {
        let result = self
            .db
            .execute(
                ACQUIRE_SQL,
                &[
                    Utc::now().into(),
                    identity.into(),
                    SqlValue::Int(LOCK_ROW_ID),
                ],
            )
            .await;
        let affected = match result {
            Ok(affected) => affected,
            Err(err) if err.code() == Some(ErrorCode::TransactionConflict) => {
                log::debug!("Migration lock acquisition for {identity} lost a write conflict");
                0
            }
            Err(err) => return Err(err.into()),
        };
        let acquired = affected == 1;
        if acquired {
            log::debug!("Migration lock acquired by {identity}");
        } else {
            log::debug!("Migration lock denied for {identity}");
        }
        Ok(acquired)
    }

    /// Unconditionally clear the lock.
    pub async fn release(&self) -> EngineResult<()> {
        self.db
            .execute(RELEASE_SQL, &[SqlValue::Int(LOCK_ROW_ID)])
            .await?;
        log::debug!("Migration lock released");
        Ok(())
    }

    /// Read the current lock row.
    pub async fn state(&self) -> EngineResult<LockState> {
        let rows = self
            .db
            .query(STATE_SQL, &[SqlValue::Int(LOCK_ROW_ID)])
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| EngineError::CorruptLedger("lock row is missing".to_string()))?;
        Ok(LockState {
            is_locked: row.get_bool(0)?,
            locked_at: row.get_opt_timestamp(1)?,
            locked_by: row.get_opt_string(2)?,
        })
    }
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod tests;
