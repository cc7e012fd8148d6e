//! Ledger and lock table DDL.

use crate::error::{EngineError, EngineResult};
use st_db::Database;

/// Append-only execution history table
pub const HISTORY_TABLE: &str = "stratum_migration_history";

/// Singleton lock table
pub const LOCK_TABLE: &str = "stratum_migration_lock";

/// Id of the one and only lock row
pub const LOCK_ROW_ID: i64 = 1;

/// Creates both tables if absent and seeds the lock row if missing.
///
/// `seq` breaks ties between entries that share a timestamp, which happens
/// whenever several entries are written by one transaction.
const SCHEMA_SQL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS stratum_migration_history_seq START 1;

CREATE TABLE IF NOT EXISTS stratum_migration_history (
    id          VARCHAR PRIMARY KEY,
    seq         BIGINT NOT NULL DEFAULT nextval('stratum_migration_history_seq'),
    name        VARCHAR NOT NULL,
    "timestamp" TIMESTAMP NOT NULL,
    batch       INTEGER NOT NULL CHECK (batch >= 1),
    status      VARCHAR NOT NULL CHECK (status IN ('applied', 'reverted', 'error')),
    checksum    VARCHAR,
    executed_by VARCHAR,
    duration_ms BIGINT,
    error       VARCHAR,
    created_at  TIMESTAMP NOT NULL,
    updated_at  TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS stratum_migration_lock (
    id        INTEGER PRIMARY KEY CHECK (id = 1),
    is_locked BOOLEAN NOT NULL DEFAULT false,
    locked_at TIMESTAMP,
    locked_by VARCHAR
);

INSERT INTO stratum_migration_lock (id, is_locked)
SELECT 1, false
WHERE NOT EXISTS (SELECT 1 FROM stratum_migration_lock);
"#;

/// Create the ledger and lock tables if absent and seed the lock row.
///
/// Safe to call on every process start.
pub async fn ensure_schema(db: &dyn Database) -> EngineResult<()> {
    log::debug!("Ensuring migration tables on {}", db.db_type());
    db.execute_batch(SCHEMA_SQL)
        .await
        .map_err(EngineError::SchemaInit)
}
