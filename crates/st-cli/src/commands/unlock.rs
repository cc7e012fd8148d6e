//! Unlock command implementation

use anyhow::{Context, Result};
use st_engine::LockManager;

use crate::cli::GlobalArgs;
use crate::commands::common::{format_timestamp, Project};

/// Execute the unlock command
pub(crate) async fn execute(global: &GlobalArgs) -> Result<()> {
    let project = Project::load(global)?;
    let db = project.open_database().await?;
    let lock = LockManager::new(db.as_ref());

    let state = lock.state().await.context("Failed to read migration lock")?;
    if !state.is_locked {
        println!("Migration lock is not held.");
        return Ok(());
    }

    lock.release()
        .await
        .context("Failed to release migration lock")?;
    log::warn!(
        "Force-released migration lock held by {}",
        state.locked_by.as_deref().unwrap_or("unknown")
    );
    println!(
        "Released migration lock (held by {} since {}).",
        state.locked_by.as_deref().unwrap_or("unknown"),
        format_timestamp(state.locked_at)
    );
    Ok(())
}
