//! Drift detection: compares a unit's current digest with the ledger.

use crate::error::EngineResult;
use crate::ledger::{Ledger, LedgerEntry, LedgerStatus};
use st_db::Database;

/// Decide whether `checksum` is acceptable given the unit's latest entry.
///
/// - no entry: new unit, passes
/// - latest is `reverted` or `error`: not applied, passes
/// - latest is `applied`: passes when either side lacks a checksum (legacy
///   rows), otherwise only on an exact match
pub fn checksum_matches(latest: Option<&LedgerEntry>, checksum: Option<&str>) -> bool {
    let Some(entry) = latest else {
        return true;
    };
    if entry.status != LedgerStatus::Applied {
        return true;
    }
    match (entry.checksum.as_deref(), checksum) {
        (Some(recorded), Some(current)) => recorded == current,
        _ => true,
    }
}

/// Checks units against the checksum recorded by their latest ledger entry.
pub struct ChecksumValidator<'a> {
    ledger: Ledger<'a>,
}

impl<'a> ChecksumValidator<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self {
            ledger: Ledger::new(db),
        }
    }

    /// Return whether `name` may run with its current `checksum`.
    pub async fn validate(&self, name: &str, checksum: Option<&str>) -> EngineResult<bool> {
        let latest = self.ledger.latest_entry(name).await?;
        let ok = checksum_matches(latest.as_ref(), checksum);
        if !ok {
            log::warn!("Checksum drift detected for {name}");
        }
        Ok(ok)
    }
}

#[cfg(test)]
#[path = "checksum_test.rs"]
mod tests;
