use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::Path;

use crate::core::{require_state_dir, RevisionLedger};
use crate::error::{EditLoopError, LedgerError};

/// Undo a revision, asking first unless `yes` is set
pub fn rollback_revision(project_root: &Path, revision_id: &str, yes: bool) -> Result<(), EditLoopError> {
    let state_dir = require_state_dir(project_root)?;
    let mut ledger = RevisionLedger::open(&state_dir)?;

    let revision = ledger
        .get(revision_id)
        .ok_or_else(|| LedgerError::RevisionNotFound(revision_id.to_string()))?;
    let active: Vec<_> = revision.active_changes().map(|c| c.file_path.clone()).collect();
    if active.is_empty() {
        println!("Revision {} has no active changes.", revision_id);
        return Ok(());
    }

    println!("Revision {}: {}", revision.id, first_line(&revision.instruction));
    for path in &active {
        println!("  {}", path.display());
    }

    if !yes && !confirm(&format!("Restore {} file(s)?", active.len()))? {
        println!("Rollback cancelled.");
        return Ok(());
    }

    let restored = ledger.rollback(revision_id, project_root)?;
    println!("Restored {} file(s).", restored);
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool, EditLoopError> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| EditLoopError::Io(std::io::Error::other(format!("Failed to get user input: {}", e))))
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
