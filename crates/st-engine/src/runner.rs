//! Batch execution of migration units.
//!
//! A run moves through `Idle → LockPending → Acquired → InTransaction →
//! {Committed | RolledBack} → Released`, or stops at `LockDenied` when another
//! process holds the lock. All units in a run share one transaction and one
//! batch number; the first failure rolls every one of them back.

use crate::checksum::ChecksumValidator;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{Ledger, LedgerRecord, LedgerStatus};
use crate::lock::LockManager;
use crate::unit::MigrationUnit;
use serde::Serialize;
use st_core::config::FALLBACK_IDENTITY;
use st_core::Direction;
use st_db::{Database, DbError};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Instant;

/// Options for a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub direction: Direction,

    /// Explicit batch: the batch number to stamp when applying, the batch to
    /// revert when reverting
    pub batch: Option<i64>,

    /// Report what would run without taking the lock or writing
    pub dry_run: bool,

    /// Log per-unit timings at info level
    pub verbose: bool,

    /// Skip checksum validation
    pub force: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Up,
            batch: None,
            dry_run: false,
            verbose: false,
            force: false,
        }
    }
}

impl RunOptions {
    pub fn up() -> Self {
        Self::default()
    }

    pub fn down() -> Self {
        Self {
            direction: Direction::Down,
            ..Self::default()
        }
    }
}

/// Furthest point a run reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    LockPending,
    Acquired,
    InTransaction,
    Committed,
    RolledBack,
    Released,
    LockDenied,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::LockPending => "lock_pending",
            RunPhase::Acquired => "acquired",
            RunPhase::InTransaction => "in_transaction",
            RunPhase::Committed => "committed",
            RunPhase::RolledBack => "rolled_back",
            RunPhase::Released => "released",
            RunPhase::LockDenied => "lock_denied",
        };
        write!(f, "{s}")
    }
}

/// A unit selected for execution, with the batch it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUnit {
    pub name: String,
    pub batch: i64,
}

/// A unit that ran successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitOutcome {
    pub name: String,
    pub batch: i64,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Nothing to do; no lock was taken
    NoPendingUnits,

    /// Dry run: the units that would have run, in execution order
    DryRun { planned: Vec<PlannedUnit> },

    /// Every unit ran and the batch was committed
    Completed { units: Vec<UnitOutcome> },
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub direction: Direction,
    pub outcome: RunOutcome,
    pub phase: RunPhase,
}

impl RunReport {
    /// Units that ran, empty for dry and no-op runs
    pub fn executed(&self) -> &[UnitOutcome] {
        match &self.outcome {
            RunOutcome::Completed { units } => units,
            _ => &[],
        }
    }
}

struct Step<'u> {
    unit: &'u dyn MigrationUnit,
    batch: i64,
}

/// What is known about the unit that broke a batch.
struct FailedUnit {
    name: String,
    batch: i64,
    checksum: String,
    duration_ms: i64,
    cause: String,
}

enum StepError {
    Engine(EngineError),
    Unit { failed: FailedUnit, source: DbError },
}

impl From<EngineError> for StepError {
    fn from(err: EngineError) -> Self {
        StepError::Engine(err)
    }
}

/// Drives one batch of units through the lock, transaction and ledger.
pub struct BatchRunner<'a> {
    db: &'a dyn Database,
    units: &'a [Box<dyn MigrationUnit>],
    executed_by: String,
    audit_failures: bool,
    phase: RunPhase,
}

impl<'a> BatchRunner<'a> {
    /// Runner over the discovered `units`. The ledger and lock tables must
    /// already exist (see [`crate::ensure_schema`]).
    pub fn new(db: &'a dyn Database, units: &'a [Box<dyn MigrationUnit>]) -> Self {
        Self {
            db,
            units,
            executed_by: FALLBACK_IDENTITY.to_string(),
            audit_failures: false,
            phase: RunPhase::Idle,
        }
    }

    /// Identity stamped on ledger entries and the lock row
    pub fn with_executed_by(mut self, identity: impl Into<String>) -> Self {
        self.executed_by = identity.into();
        self
    }

    /// Write the `error` entry after rolling back instead of inside the
    /// batch transaction, so it survives the rollback
    pub fn with_audit_failures(mut self, audit_failures: bool) -> Self {
        self.audit_failures = audit_failures;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn transition(&mut self, next: RunPhase) {
        log::debug!("Run phase {} -> {}", self.phase, next);
        self.phase = next;
    }

    fn ledger(&self) -> Ledger<'a> {
        Ledger::new(self.db).with_executed_by(self.executed_by.clone())
    }

    /// Execute one run.
    ///
    /// Planning failures (duplicate names, invalid batch, unknown revert
    /// targets) surface before the lock is touched. Once the lock is held it
    /// is released on every path.
    pub async fn run(&mut self, options: &RunOptions) -> EngineResult<RunReport> {
        self.phase = RunPhase::Idle;

        if let Some(batch) = options.batch {
            if batch < 1 {
                return Err(EngineError::InvalidBatch { batch });
            }
        }

        let by_name = self.index_units()?;
        let plan = match options.direction {
            Direction::Up => self.plan_apply(&by_name, options.batch).await?,
            Direction::Down => self.plan_revert(&by_name, options.batch).await?,
        };

        if plan.is_empty() {
            log::info!("No pending migrations");
            return Ok(self.report(options, RunOutcome::NoPendingUnits));
        }

        if options.dry_run {
            let planned: Vec<PlannedUnit> = plan
                .iter()
                .map(|step| PlannedUnit {
                    name: step.unit.name().to_string(),
                    batch: step.batch,
                })
                .collect();
            for unit in &planned {
                log::info!(
                    "[dry-run] Would {} {} (batch {})",
                    verb(options.direction),
                    unit.name,
                    unit.batch
                );
            }
            return Ok(self.report(options, RunOutcome::DryRun { planned }));
        }

        self.transition(RunPhase::LockPending);
        let lock = LockManager::new(self.db);
        if !lock.acquire(&self.executed_by).await? {
            self.transition(RunPhase::LockDenied);
            let holder = lock
                .state()
                .await
                .ok()
                .and_then(|state| state.locked_by)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(EngineError::LockDenied { holder });
        }
        self.transition(RunPhase::Acquired);

        let result = self.execute(&plan, options).await;

        let released = lock.release().await;
        self.transition(RunPhase::Released);

        match (result, released) {
            (Ok(units), Ok(())) => Ok(self.report(options, RunOutcome::Completed { units })),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                log::error!("Failed to release migration lock: {release_err}");
                Err(err)
            }
        }
    }

    fn report(&self, options: &RunOptions, outcome: RunOutcome) -> RunReport {
        RunReport {
            direction: options.direction,
            outcome,
            phase: self.phase,
        }
    }

    fn index_units(&self) -> EngineResult<HashMap<&'a str, &'a dyn MigrationUnit>> {
        let mut by_name = HashMap::with_capacity(self.units.len());
        for unit in self.units {
            let unit: &'a dyn MigrationUnit = unit.as_ref();
            if by_name.insert(unit.name().as_str(), unit).is_some() {
                return Err(EngineError::DuplicateUnit {
                    name: unit.name().to_string(),
                });
            }
        }
        Ok(by_name)
    }

    /// Discovered units not currently applied, in name order.
    async fn plan_apply(
        &self,
        by_name: &HashMap<&'a str, &'a dyn MigrationUnit>,
        batch: Option<i64>,
    ) -> EngineResult<Vec<Step<'a>>> {
        let ledger = self.ledger();
        let applied: HashSet<String> = ledger.currently_applied().await?.into_iter().collect();

        let mut pending: Vec<&'a dyn MigrationUnit> = by_name
            .values()
            .copied()
            .filter(|unit| !applied.contains(unit.name().as_str()))
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        pending.sort_by(|a, b| a.name().cmp(b.name()));

        let batch = match batch {
            Some(batch) => batch,
            None => ledger.latest_batch_number().await? + 1,
        };
        Ok(pending
            .into_iter()
            .map(|unit| Step { unit, batch })
            .collect())
    }

    /// Applied units (optionally of one batch), newest application first.
    async fn plan_revert(
        &self,
        by_name: &HashMap<&'a str, &'a dyn MigrationUnit>,
        batch: Option<i64>,
    ) -> EngineResult<Vec<Step<'a>>> {
        let ledger = self.ledger();
        let targets = match batch {
            Some(batch) => ledger.members_of_batch(batch).await?,
            None => ledger.currently_applied().await?,
        };

        let mut plan = Vec::with_capacity(targets.len());
        for name in targets.into_iter().rev() {
            let unit = by_name
                .get(name.as_str())
                .copied()
                .ok_or_else(|| EngineError::UnknownUnit { name: name.clone() })?;
            let entry = ledger.latest_entry(&name).await?.ok_or_else(|| {
                EngineError::CorruptLedger(format!("no history for applied unit '{name}'"))
            })?;
            plan.push(Step {
                unit,
                batch: entry.batch,
            });
        }
        Ok(plan)
    }

    /// Run the plan inside one transaction and settle it.
    async fn execute(
        &mut self,
        plan: &[Step<'a>],
        options: &RunOptions,
    ) -> EngineResult<Vec<UnitOutcome>> {
        self.db.begin().await?;
        self.transition(RunPhase::InTransaction);

        let outcome = self.run_steps(plan, options).await;
        match outcome {
            Ok(units) => match self.db.commit().await {
                Ok(()) => {
                    self.transition(RunPhase::Committed);
                    Ok(units)
                }
                Err(err) => {
                    self.rollback().await;
                    Err(err.into())
                }
            },
            Err(StepError::Engine(err)) => {
                self.rollback().await;
                Err(err)
            }
            Err(StepError::Unit { failed, source }) => {
                self.rollback().await;
                if self.audit_failures {
                    self.record_failure(&failed).await;
                }
                Err(EngineError::UnitExecutionFailed {
                    name: failed.name,
                    cause: failed.cause,
                    source,
                })
            }
        }
    }

    async fn rollback(&mut self) {
        if let Err(err) = self.db.rollback().await {
            log::error!("Rollback failed: {err}");
        }
        self.transition(RunPhase::RolledBack);
    }

    async fn run_steps(
        &self,
        plan: &[Step<'a>],
        options: &RunOptions,
    ) -> Result<Vec<UnitOutcome>, StepError> {
        let ledger = self.ledger();
        let validator = ChecksumValidator::new(self.db);
        let mut outcomes = Vec::with_capacity(plan.len());

        for step in plan {
            let name = step.unit.name().as_str();
            let checksum = step.unit.checksum();

            if !options.force && !validator.validate(name, Some(&checksum)).await? {
                return Err(EngineError::ChecksumMismatch {
                    name: name.to_string(),
                }
                .into());
            }

            log::info!("{} {name}", progressive(options.direction));
            let start = Instant::now();
            let result = match options.direction {
                Direction::Up => step.unit.apply(self.db).await,
                Direction::Down => step.unit.revert(self.db).await,
            };
            let duration_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

            match result {
                Ok(()) => {
                    let status = match options.direction {
                        Direction::Up => LedgerStatus::Applied,
                        Direction::Down => LedgerStatus::Reverted,
                    };
                    ledger
                        .record(&LedgerRecord {
                            name,
                            batch: step.batch,
                            status,
                            checksum: Some(&checksum),
                            duration_ms,
                            error: None,
                        })
                        .await?;
                    if options.verbose {
                        log::info!("{name} {status} in {duration_ms}ms");
                    } else {
                        log::debug!("{name} {status} in {duration_ms}ms");
                    }
                    outcomes.push(UnitOutcome {
                        name: name.to_string(),
                        batch: step.batch,
                        duration_ms,
                    });
                }
                Err(source) => {
                    let failed = FailedUnit {
                        name: name.to_string(),
                        batch: step.batch,
                        checksum,
                        duration_ms,
                        cause: source.describe(),
                    };
                    log::error!("{} failed: {}", failed.name, failed.cause);
                    if !self.audit_failures {
                        self.record_failure(&failed).await;
                    }
                    return Err(StepError::Unit { failed, source });
                }
            }
        }
        Ok(outcomes)
    }

    /// Append the `error` entry for a failed unit. A failed unit can leave the
    /// transaction aborted, so this write is allowed to fail.
    async fn record_failure(&self, failed: &FailedUnit) {
        let record = LedgerRecord {
            name: &failed.name,
            batch: failed.batch,
            status: LedgerStatus::Error,
            checksum: Some(&failed.checksum),
            duration_ms: failed.duration_ms,
            error: Some(&failed.cause),
        };
        if let Err(err) = self.ledger().record(&record).await {
            log::warn!("Could not record failure of {}: {err}", failed.name);
        }
    }
}

fn verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Up => "apply",
        Direction::Down => "revert",
    }
}

fn progressive(direction: Direction) -> &'static str {
    match direction {
        Direction::Up => "Applying",
        Direction::Down => "Reverting",
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
