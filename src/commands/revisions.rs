use std::path::Path;

use crate::core::{require_state_dir, RevisionLedger};
use crate::error::EditLoopError;

/// List recorded revisions, newest first
pub fn show_revisions(project_root: &Path, verbose: bool) -> Result<(), EditLoopError> {
    let ledger = RevisionLedger::open(&require_state_dir(project_root)?)?;

    if ledger.revisions().is_empty() {
        println!("No revisions recorded.");
        return Ok(());
    }

    println!("=== Revisions ===\n");
    for revision in ledger.revisions().iter().rev() {
        let state = if revision.has_active_changes() {
            "active"
        } else if revision.changes.is_empty() {
            "empty"
        } else {
            "reverted"
        };
        let summary: String = revision.instruction.lines().next().unwrap_or_default().chars().take(60).collect();
        println!(
            "{} [{}] {} - {}",
            revision.id,
            state,
            revision.created_at.format("%Y-%m-%d %H:%M"),
            summary
        );

        if verbose {
            for change in &revision.changes {
                println!("    {:?} {}", change.status, change.file_path.display());
            }
        }
    }
    Ok(())
}
