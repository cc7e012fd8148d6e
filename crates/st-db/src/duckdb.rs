//! DuckDB database backend implementation

use crate::error::{DbError, DbResult};
use crate::traits::Database;
use crate::value::{Row, SqlValue};
use async_trait::async_trait;
use chrono::DateTime;
use duckdb::types::{TimeUnit, Value};
use duckdb::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Text format used to bind timestamps; statements cast it to `TIMESTAMP`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// DuckDB database backend.
///
/// All statements go through one connection, so a transaction opened with
/// [`Database::begin`] covers every later call until it is closed.
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{e}: {}", path.display())))?;
        Ok(Self::from_connection(conn))
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open a second connection to the same database instance.
    ///
    /// The clone has its own transaction state, which makes it behave like
    /// another process contending for the same tables.
    pub fn try_clone(&self) -> DbResult<Self> {
        let conn = self.lock()?;
        let cloned = conn
            .try_clone()
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self::from_connection(cloned))
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    /// Execute SQL synchronously
    fn execute_sync(&self, sql: &str, params: &[SqlValue]) -> DbResult<usize> {
        let conn = self.lock()?;
        log::trace!("execute: {sql}");
        conn.execute(sql, duckdb::params_from_iter(to_duckdb_params(params)))
            .map_err(DbError::from)
    }

    /// Execute batch SQL synchronously
    fn execute_batch_sync(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        log::trace!("execute_batch: {sql}");
        conn.execute_batch(sql).map_err(DbError::from)
    }

    /// Query rows synchronously
    fn query_sync(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Row>> {
        let conn = self.lock()?;
        log::trace!("query: {sql}");
        let mut stmt = conn.prepare(sql)?;

        // Column metadata is only reliable after execution, so read the
        // count from each row.
        let raw_rows: Vec<Vec<Value>> = stmt
            .query_map(duckdb::params_from_iter(to_duckdb_params(params)), |row| {
                let col_count = row.as_ref().column_count();
                (0..col_count)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<Result<Vec<_>, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw_rows
            .into_iter()
            .map(|values| {
                values
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| from_duckdb_value(i, v))
                    .collect::<DbResult<Vec<_>>>()
                    .map(Row::new)
            })
            .collect()
    }

    fn transaction_sync(&self, operation: &'static str, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        log::trace!("{operation}");
        conn.execute_batch(sql)
            .map_err(|e| DbError::TransactionError {
                operation,
                message: e.to_string(),
            })
    }

    /// Check if relation exists synchronously
    fn relation_exists_sync(&self, name: &str) -> DbResult<bool> {
        // Handle schema-qualified names
        let (schema, table) = match name.rsplit_once('.') {
            Some((schema, table)) => (schema, table),
            None => ("main", name),
        };

        let rows = self.query_sync(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
            &[schema.into(), table.into()],
        )?;
        let count = match rows.first() {
            Some(row) => row.get_i64(0)?,
            None => 0,
        };
        Ok(count > 0)
    }
}

fn to_duckdb_params(params: &[SqlValue]) -> Vec<Value> {
    params.iter().map(to_duckdb_value).collect()
}

fn to_duckdb_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(v) => Value::Boolean(*v),
        SqlValue::Int(v) => Value::BigInt(*v),
        SqlValue::Float(v) => Value::Double(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::Timestamp(v) => Value::Text(v.format(TIMESTAMP_FORMAT).to_string()),
    }
}

fn from_duckdb_value(index: usize, value: Value) -> DbResult<SqlValue> {
    let unsupported = |found: String| DbError::TypeMismatch {
        index,
        expected: "a supported column type",
        found,
    };

    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(v) => SqlValue::Bool(v),
        Value::TinyInt(v) => SqlValue::Int(i64::from(v)),
        Value::SmallInt(v) => SqlValue::Int(i64::from(v)),
        Value::Int(v) => SqlValue::Int(i64::from(v)),
        Value::BigInt(v) => SqlValue::Int(v),
        Value::UTinyInt(v) => SqlValue::Int(i64::from(v)),
        Value::USmallInt(v) => SqlValue::Int(i64::from(v)),
        Value::UInt(v) => SqlValue::Int(i64::from(v)),
        Value::UBigInt(v) => {
            SqlValue::Int(i64::try_from(v).map_err(|_| unsupported(format!("UBIGINT {v}")))?)
        }
        Value::HugeInt(v) => {
            SqlValue::Int(i64::try_from(v).map_err(|_| unsupported(format!("HUGEINT {v}")))?)
        }
        Value::Float(v) => SqlValue::Float(f64::from(v)),
        Value::Double(v) => SqlValue::Float(v),
        Value::Text(v) => SqlValue::Text(v),
        Value::Timestamp(unit, v) => {
            let micros = match unit {
                TimeUnit::Second => v.saturating_mul(1_000_000),
                TimeUnit::Millisecond => v.saturating_mul(1_000),
                TimeUnit::Microsecond => v,
                TimeUnit::Nanosecond => v / 1_000,
            };
            let ts = DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| unsupported(format!("TIMESTAMP {micros}us out of range")))?;
            SqlValue::Timestamp(ts)
        }
        other => return Err(unsupported(format!("{other:?}"))),
    })
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<usize> {
        self.execute_sync(sql, params)
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.execute_batch_sync(sql)
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Row>> {
        self.query_sync(sql, params)
    }

    async fn begin(&self) -> DbResult<()> {
        self.transaction_sync("BEGIN", "BEGIN TRANSACTION")
    }

    async fn commit(&self) -> DbResult<()> {
        self.transaction_sync("COMMIT", "COMMIT")
    }

    async fn rollback(&self) -> DbResult<()> {
        self.transaction_sync("ROLLBACK", "ROLLBACK")
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        self.relation_exists_sync(name)
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
