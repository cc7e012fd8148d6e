use super::*;
use crate::ledger::{Ledger, LedgerStatus};
use crate::lock::LockManager;
use crate::schema::ensure_schema;
use crate::unit::SqlUnit;
use async_trait::async_trait;
use st_core::{UnitName, UnitSource};
use st_db::{DbResult, DuckDbBackend, Row, SqlValue};

async fn setup() -> DuckDbBackend {
    let db = DuckDbBackend::in_memory().unwrap();
    ensure_schema(&db).await.unwrap();
    db
}

fn sql(name: &str, up: &str, down: &str) -> Box<dyn MigrationUnit> {
    let source = UnitSource::from_parts(UnitName::parse(name).unwrap(), up, down).unwrap();
    Box::new(SqlUnit::new(source))
}

fn table_unit(name: &str, table: &str) -> Box<dyn MigrationUnit> {
    sql(
        name,
        &format!("CREATE TABLE {table} (id INTEGER);"),
        &format!("DROP TABLE {table};"),
    )
}

/// A unit whose apply fails without touching the database.
struct Exploding {
    name: UnitName,
}

#[async_trait]
impl MigrationUnit for Exploding {
    fn name(&self) -> &UnitName {
        &self.name
    }

    fn source_text(&self) -> &str {
        "boom"
    }

    async fn apply(&self, _db: &dyn Database) -> DbResult<()> {
        Err(DbError::execution("exploded"))
    }

    async fn revert(&self, _db: &dyn Database) -> DbResult<()> {
        Ok(())
    }
}

async fn history_rows(db: &DuckDbBackend) -> i64 {
    db.query("SELECT COUNT(*) FROM stratum_migration_history", &[])
        .await
        .unwrap()[0]
        .get_i64(0)
        .unwrap()
}

#[tokio::test]
async fn apply_runs_pending_units_in_name_order() {
    let db = setup().await;
    let units = vec![table_unit("002_b", "b"), table_unit("001_a", "a")];
    let mut runner = BatchRunner::new(&db, &units).with_executed_by("alice");

    let report = runner.run(&RunOptions::up()).await.unwrap();
    let names: Vec<&str> = report.executed().iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["001_a", "002_b"]);
    assert!(report.executed().iter().all(|u| u.batch == 1));
    assert_eq!(report.phase, RunPhase::Released);
    assert_eq!(runner.phase(), RunPhase::Released);

    let ledger = Ledger::new(&db);
    assert_eq!(ledger.currently_applied().await.unwrap(), vec!["001_a", "002_b"]);
    let entry = ledger.latest_entry("001_a").await.unwrap().unwrap();
    assert_eq!(entry.executed_by.as_deref(), Some("alice"));
    assert_eq!(entry.checksum, Some(units[1].checksum()));
    assert!(!LockManager::new(&db).state().await.unwrap().is_locked);
}

#[tokio::test]
async fn second_apply_has_nothing_pending() {
    let db = setup().await;
    let units = vec![table_unit("001_a", "a")];
    let mut runner = BatchRunner::new(&db, &units);
    runner.run(&RunOptions::up()).await.unwrap();

    let report = runner.run(&RunOptions::up()).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::NoPendingUnits);
    assert_eq!(report.phase, RunPhase::Idle);
    assert_eq!(history_rows(&db).await, 1);
}

#[tokio::test]
async fn each_run_gets_the_next_batch() {
    let db = setup().await;
    let mut units = vec![table_unit("001_a", "a")];
    BatchRunner::new(&db, &units)
        .run(&RunOptions::up())
        .await
        .unwrap();

    units.push(table_unit("002_b", "b"));
    let report = BatchRunner::new(&db, &units)
        .run(&RunOptions::up())
        .await
        .unwrap();
    assert_eq!(
        report.executed(),
        &[UnitOutcome {
            name: "002_b".to_string(),
            batch: 2,
            duration_ms: report.executed()[0].duration_ms,
        }]
    );
}

#[tokio::test]
async fn explicit_batch_overrides_numbering() {
    let db = setup().await;
    let units = vec![table_unit("001_a", "a")];
    let options = RunOptions {
        batch: Some(7),
        ..RunOptions::up()
    };
    BatchRunner::new(&db, &units).run(&options).await.unwrap();
    assert_eq!(Ledger::new(&db).latest_batch_number().await.unwrap(), 7);
}

#[tokio::test]
async fn batch_below_one_is_rejected_before_locking() {
    let db = setup().await;
    let units = vec![table_unit("001_a", "a")];
    let options = RunOptions {
        batch: Some(0),
        ..RunOptions::up()
    };
    let mut runner = BatchRunner::new(&db, &units);
    let err = runner.run(&options).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidBatch { batch: 0 }));
    assert_eq!(runner.phase(), RunPhase::Idle);
    assert_eq!(history_rows(&db).await, 0);
}

#[tokio::test]
async fn duplicate_unit_names_are_rejected() {
    let db = setup().await;
    let units = vec![table_unit("001_a", "a"), table_unit("001_a", "b")];
    let err = BatchRunner::new(&db, &units)
        .run(&RunOptions::up())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateUnit { ref name } if name == "001_a"));
}

#[tokio::test]
async fn dry_run_reports_without_writing() {
    let db = setup().await;
    let units = vec![table_unit("001_a", "a"), table_unit("002_b", "b")];
    let options = RunOptions {
        dry_run: true,
        ..RunOptions::up()
    };
    let mut runner = BatchRunner::new(&db, &units);
    let report = runner.run(&options).await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::DryRun {
            planned: vec![
                PlannedUnit {
                    name: "001_a".to_string(),
                    batch: 1
                },
                PlannedUnit {
                    name: "002_b".to_string(),
                    batch: 1
                },
            ]
        }
    );
    assert_eq!(runner.phase(), RunPhase::Idle);
    assert_eq!(history_rows(&db).await, 0);
    assert!(!db.relation_exists("a").await.unwrap());
}

#[tokio::test]
async fn held_lock_denies_the_run() {
    let db = setup().await;
    LockManager::new(&db).acquire("other-host").await.unwrap();
    let units = vec![table_unit("001_a", "a")];
    let mut runner = BatchRunner::new(&db, &units);

    let err = runner.run(&RunOptions::up()).await.unwrap_err();
    assert!(matches!(err, EngineError::LockDenied { ref holder } if holder == "other-host"));
    assert_eq!(runner.phase(), RunPhase::LockDenied);
    assert_eq!(history_rows(&db).await, 0);
    assert!(!db.relation_exists("a").await.unwrap());

    let state = LockManager::new(&db).state().await.unwrap();
    assert_eq!(state.locked_by.as_deref(), Some("other-host"));
}

/// Delegates to DuckDB, but fails every read of the lock row and makes every
/// acquisition update touch nothing.
struct LockRowUnreadable(DuckDbBackend);

#[async_trait]
impl Database for LockRowUnreadable {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<usize> {
        if sql.contains("SET is_locked = true") {
            return Ok(0);
        }
        self.0.execute(sql, params).await
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.0.execute_batch(sql).await
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Row>> {
        if sql.contains("FROM stratum_migration_lock") {
            return Err(DbError::execution("connection reset"));
        }
        self.0.query(sql, params).await
    }

    async fn begin(&self) -> DbResult<()> {
        self.0.begin().await
    }

    async fn commit(&self) -> DbResult<()> {
        self.0.commit().await
    }

    async fn rollback(&self) -> DbResult<()> {
        self.0.rollback().await
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        self.0.relation_exists(name).await
    }

    fn db_type(&self) -> &'static str {
        self.0.db_type()
    }
}

#[tokio::test]
async fn denied_run_reports_unknown_holder_when_lock_row_is_unreadable() {
    let db = LockRowUnreadable(setup().await);
    let units = vec![table_unit("001_a", "a")];
    let mut runner = BatchRunner::new(&db, &units);

    let err = runner.run(&RunOptions::up()).await.unwrap_err();
    assert!(matches!(err, EngineError::LockDenied { ref holder } if holder == "unknown"));
    assert_eq!(runner.phase(), RunPhase::LockDenied);
    assert_eq!(history_rows(&db.0).await, 0);
}

#[tokio::test]
async fn failure_rolls_back_the_whole_batch() {
    let db = setup().await;
    let units = vec![
        table_unit("001_a", "a"),
        table_unit("002_b", "b"),
        sql("003_c", "SELECT * FROM no_such_table;", ""),
        table_unit("004_d", "d"),
    ];
    let mut runner = BatchRunner::new(&db, &units);

    let err = runner.run(&RunOptions::up()).await.unwrap_err();
    match err {
        EngineError::UnitExecutionFailed { name, cause, .. } => {
            assert_eq!(name, "003_c");
            assert_eq!(cause, "Relation does not exist");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runner.phase(), RunPhase::Released);
    assert_eq!(history_rows(&db).await, 0);
    assert!(!db.relation_exists("a").await.unwrap());
    assert!(!db.relation_exists("b").await.unwrap());
    assert!(!LockManager::new(&db).state().await.unwrap().is_locked);
}

#[tokio::test]
async fn audited_failure_survives_rollback() {
    let db = setup().await;
    let units: Vec<Box<dyn MigrationUnit>> = vec![
        table_unit("001_a", "a"),
        Box::new(Exploding {
            name: UnitName::parse("002_boom").unwrap(),
        }),
    ];
    let mut runner = BatchRunner::new(&db, &units).with_audit_failures(true);
    runner.run(&RunOptions::up()).await.unwrap_err();

    let ledger = Ledger::new(&db);
    assert!(ledger.currently_applied().await.unwrap().is_empty());
    assert!(ledger.latest_entry("001_a").await.unwrap().is_none());
    let failed = ledger.latest_entry("002_boom").await.unwrap().unwrap();
    assert_eq!(failed.status, LedgerStatus::Error);
    assert_eq!(failed.batch, 1);
    assert_eq!(failed.error.as_deref(), Some("exploded"));
    assert!(!db.relation_exists("a").await.unwrap());
}

#[tokio::test]
async fn revert_runs_in_reverse_application_order() {
    let db = setup().await;
    let units = vec![table_unit("001_a", "a"), table_unit("002_b", "b")];
    let mut runner = BatchRunner::new(&db, &units);
    runner.run(&RunOptions::up()).await.unwrap();

    let report = runner.run(&RunOptions::down()).await.unwrap();
    let names: Vec<&str> = report.executed().iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["002_b", "001_a"]);
    assert!(report.executed().iter().all(|u| u.batch == 1));

    let ledger = Ledger::new(&db);
    assert!(ledger.currently_applied().await.unwrap().is_empty());
    let entry = ledger.latest_entry("001_a").await.unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::Reverted);
    assert_eq!(entry.batch, 1);
    assert!(!db.relation_exists("a").await.unwrap());
}

#[tokio::test]
async fn revert_of_explicit_batch_leaves_others_applied() {
    let db = setup().await;
    let mut units = vec![table_unit("001_a", "a")];
    BatchRunner::new(&db, &units)
        .run(&RunOptions::up())
        .await
        .unwrap();
    units.push(table_unit("002_b", "b"));
    BatchRunner::new(&db, &units)
        .run(&RunOptions::up())
        .await
        .unwrap();

    let options = RunOptions {
        batch: Some(1),
        ..RunOptions::down()
    };
    let report = BatchRunner::new(&db, &units).run(&options).await.unwrap();
    assert_eq!(report.executed().len(), 1);
    assert_eq!(report.executed()[0].name, "001_a");
    assert_eq!(
        Ledger::new(&db).currently_applied().await.unwrap(),
        vec!["002_b"]
    );
}

#[tokio::test]
async fn revert_with_nothing_applied_is_a_no_op() {
    let db = setup().await;
    let units = vec![table_unit("001_a", "a")];
    let report = BatchRunner::new(&db, &units)
        .run(&RunOptions::down())
        .await
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::NoPendingUnits);
}

#[tokio::test]
async fn revert_of_missing_unit_fails_before_locking() {
    let db = setup().await;
    let units = vec![table_unit("001_a", "a")];
    BatchRunner::new(&db, &units)
        .run(&RunOptions::up())
        .await
        .unwrap();

    let remaining: Vec<Box<dyn MigrationUnit>> = Vec::new();
    let mut runner = BatchRunner::new(&db, &remaining);
    let err = runner.run(&RunOptions::down()).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownUnit { ref name } if name == "001_a"));
    assert_eq!(runner.phase(), RunPhase::Idle);
}

#[tokio::test]
async fn drifted_unit_blocks_revert_unless_forced() {
    let db = setup().await;
    let original = vec![table_unit("001_a", "a")];
    BatchRunner::new(&db, &original)
        .run(&RunOptions::up())
        .await
        .unwrap();

    let edited = vec![sql(
        "001_a",
        "CREATE TABLE a (id INTEGER, extra TEXT);",
        "DROP TABLE a;",
    )];
    let mut runner = BatchRunner::new(&db, &edited);
    let err = runner.run(&RunOptions::down()).await.unwrap_err();
    assert!(matches!(err, EngineError::ChecksumMismatch { ref name } if name == "001_a"));
    assert_eq!(runner.phase(), RunPhase::Released);
    assert!(db.relation_exists("a").await.unwrap());

    let forced = RunOptions {
        force: true,
        ..RunOptions::down()
    };
    runner.run(&forced).await.unwrap();
    assert!(!db.relation_exists("a").await.unwrap());
}

#[test]
fn phase_display_is_snake_case() {
    assert_eq!(RunPhase::InTransaction.to_string(), "in_transaction");
    assert_eq!(RunPhase::LockDenied.to_string(), "lock_denied");
}
