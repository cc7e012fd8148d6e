//! Database capability trait

use crate::error::DbResult;
use crate::value::{Row, SqlValue};
use async_trait::async_trait;

/// Database capability the migration engine is written against.
///
/// Implementations must be Send + Sync for async operation. Every call is a
/// single round-trip; statements issued between [`begin`](Self::begin) and
/// [`commit`](Self::commit)/[`rollback`](Self::rollback) share one
/// transaction.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute one statement with bound parameters, returning affected rows
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<usize>;

    /// Execute multiple `;`-separated statements without parameters
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Run a query with bound parameters and collect every row
    async fn query(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Row>>;

    /// Open a transaction
    async fn begin(&self) -> DbResult<()>;

    /// Commit the open transaction
    async fn commit(&self) -> DbResult<()>;

    /// Roll back the open transaction
    async fn rollback(&self) -> DbResult<()>;

    /// Check if a table or view exists
    async fn relation_exists(&self, name: &str) -> DbResult<bool>;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;
}
