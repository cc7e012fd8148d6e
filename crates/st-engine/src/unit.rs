//! Migration units: the named apply/revert pairs the runner executes.

use async_trait::async_trait;
use st_core::{digest, UnitName, UnitSource};
use st_db::{Database, DbResult};

/// A named, orderable migration.
///
/// The runner never mutates a unit; it reads its text for checksumming and
/// invokes `apply`/`revert` with the handle that carries the batch
/// transaction.
#[async_trait]
pub trait MigrationUnit: Send + Sync {
    /// Stable identity; ordering between units is the order of their names
    fn name(&self) -> &UnitName;

    /// Raw definition text the checksum is computed from
    fn source_text(&self) -> &str;

    /// Digest of [`source_text`](Self::source_text)
    fn checksum(&self) -> String {
        digest(self.source_text())
    }

    /// Move the schema forward
    async fn apply(&self, db: &dyn Database) -> DbResult<()>;

    /// Undo what `apply` did
    async fn revert(&self, db: &dyn Database) -> DbResult<()>;
}

/// A unit backed by a SQL migration file.
#[derive(Debug, Clone)]
pub struct SqlUnit {
    source: UnitSource,
}

impl SqlUnit {
    pub fn new(source: UnitSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &UnitSource {
        &self.source
    }

    /// Wrap discovered files as boxed units, preserving their order.
    pub fn boxed_all(sources: Vec<UnitSource>) -> Vec<Box<dyn MigrationUnit>> {
        sources
            .into_iter()
            .map(|s| Box::new(SqlUnit::new(s)) as Box<dyn MigrationUnit>)
            .collect()
    }
}

impl From<UnitSource> for SqlUnit {
    fn from(source: UnitSource) -> Self {
        Self::new(source)
    }
}

#[async_trait]
impl MigrationUnit for SqlUnit {
    fn name(&self) -> &UnitName {
        &self.source.name
    }

    fn source_text(&self) -> &str {
        &self.source.text
    }

    async fn apply(&self, db: &dyn Database) -> DbResult<()> {
        log::debug!("{}:\n{}", self.source.name, self.source.up_sql);
        db.execute_batch(&self.source.up_sql).await
    }

    async fn revert(&self, db: &dyn Database) -> DbResult<()> {
        if self.source.down_sql.is_empty() {
            log::warn!(
                "{} has an empty down section; revert is a no-op",
                self.source.name
            );
            return Ok(());
        }
        log::debug!("{}:\n{}", self.source.name, self.source.down_sql);
        db.execute_batch(&self.source.down_sql).await
    }
}
