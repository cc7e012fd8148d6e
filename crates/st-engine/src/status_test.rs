use super::*;
use crate::ledger::LedgerRecord;
use crate::runner::{BatchRunner, RunOptions};
use crate::schema::ensure_schema;
use crate::unit::SqlUnit;
use st_core::{UnitName, UnitSource};
use st_db::DuckDbBackend;

async fn setup() -> DuckDbBackend {
    let db = DuckDbBackend::in_memory().unwrap();
    ensure_schema(&db).await.unwrap();
    db
}

fn unit(name: &str, up: &str) -> Box<dyn MigrationUnit> {
    let source = UnitSource::from_parts(UnitName::parse(name).unwrap(), up, "").unwrap();
    Box::new(SqlUnit::new(source))
}

#[tokio::test]
async fn fresh_database_reports_everything_pending() {
    let db = setup().await;
    let units = vec![unit("002_b", "SELECT 1;"), unit("001_a", "SELECT 1;")];
    let report = status_report(&db, &units).await.unwrap();

    assert_eq!(
        report.summary,
        StatusSummary {
            total: 2,
            executed: 0,
            pending: 2,
            failed: 0,
            latest_batch: 0,
        }
    );
    let names: Vec<&str> = report.units.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["001_a", "002_b"]);
    assert!(report.units.iter().all(|u| u.state == UnitState::Pending));
    assert!(report.orphans.is_empty());
    assert!(!report.lock.is_locked);
}

#[tokio::test]
async fn applied_units_carry_ledger_details() {
    let db = setup().await;
    let units = vec![
        unit("001_a", "CREATE TABLE a (id INTEGER);"),
        unit("002_b", "CREATE TABLE b (id INTEGER);"),
    ];
    BatchRunner::new(&db, &units[..1])
        .with_executed_by("alice")
        .run(&RunOptions::up())
        .await
        .unwrap();

    let report = status_report(&db, &units).await.unwrap();
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.executed, 1);
    assert_eq!(report.summary.pending, 1);
    assert_eq!(report.summary.latest_batch, 1);

    let a = &report.units[0];
    assert_eq!(a.state, UnitState::Applied);
    assert_eq!(a.batch, Some(1));
    assert_eq!(a.execution_count, 1);
    assert_eq!(a.executed_by.as_deref(), Some("alice"));
    assert!(a.last_run_at.is_some());
    assert!(!a.drifted);
    assert_eq!(report.units[1].state, UnitState::Pending);
}

#[tokio::test]
async fn failed_units_are_counted_and_listed() {
    let db = setup().await;
    Ledger::new(&db)
        .record(&LedgerRecord {
            name: "001_a",
            batch: 1,
            status: LedgerStatus::Error,
            checksum: None,
            duration_ms: 4,
            error: Some("Relation does not exist"),
        })
        .await
        .unwrap();

    let units = vec![unit("001_a", "SELECT 1;")];
    let report = status_report(&db, &units).await.unwrap();
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.executed, 0);
    assert_eq!(report.summary.pending, 1);

    let failures: Vec<&UnitStatusRow> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].error.as_deref(), Some("Relation does not exist"));
}

#[tokio::test]
async fn edited_units_are_flagged_as_drifted() {
    let db = setup().await;
    let original = vec![unit("001_a", "CREATE TABLE a (id INTEGER);")];
    BatchRunner::new(&db, &original)
        .run(&RunOptions::up())
        .await
        .unwrap();

    let edited = vec![unit("001_a", "CREATE TABLE a (id BIGINT);")];
    let report = status_report(&db, &edited).await.unwrap();
    let drifted: Vec<&str> = report.drifted().map(|u| u.name.as_str()).collect();
    assert_eq!(drifted, vec!["001_a"]);
}

#[tokio::test]
async fn history_without_a_unit_is_an_orphan() {
    let db = setup().await;
    let units = vec![unit("001_a", "SELECT 1;")];
    BatchRunner::new(&db, &units)
        .run(&RunOptions::up())
        .await
        .unwrap();

    let report = status_report(&db, &[]).await.unwrap();
    assert_eq!(report.summary.total, 0);
    assert_eq!(report.summary.latest_batch, 1);
    assert_eq!(report.orphans.len(), 1);
    assert_eq!(report.orphans[0].name, "001_a");
    assert!(!report.orphans[0].drifted);
}

#[tokio::test]
async fn held_lock_is_reported() {
    let db = setup().await;
    LockManager::new(&db).acquire("deploy-bot").await.unwrap();
    let report = status_report(&db, &[]).await.unwrap();
    assert!(report.lock.is_locked);
    assert_eq!(report.lock.locked_by.as_deref(), Some("deploy-bot"));
}

#[test]
fn ledger_status_maps_to_unit_state() {
    assert_eq!(UnitState::from(LedgerStatus::Reverted), UnitState::Reverted);
    assert_eq!(UnitState::Pending.to_string(), "pending");
}
