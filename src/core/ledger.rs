use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::models::{ChangeRecord, ChangeStatus, Revision};

/// File name of the ledger inside the state directory
pub const LEDGER_FILE: &str = "revisions.json";

/// Durable record of revisions and the file changes made under them
pub struct RevisionLedger {
    ledger_file: PathBuf,
    revisions: Vec<Revision>,
}

impl RevisionLedger {
    /// Open the ledger in `state_dir`, loading any existing revisions
    pub fn open(state_dir: &Path) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            ledger_file: state_dir.join(LEDGER_FILE),
            revisions: Vec::new(),
        };
        ledger.load()?;
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.ledger_file
    }

    fn load(&mut self) -> Result<(), LedgerError> {
        if !self.ledger_file.exists() {
            debug!("Ledger file does not exist, starting fresh");
            return Ok(());
        }

        let content = fs::read_to_string(&self.ledger_file)
            .map_err(|e| LedgerError::ReadError(self.ledger_file.clone(), e))?;
        if content.trim().is_empty() {
            return Ok(());
        }

        self.revisions = serde_json::from_str(&content)
            .map_err(|e| LedgerError::ParseError(self.ledger_file.clone(), e.to_string()))?;
        debug!("Loaded {} revisions", self.revisions.len());
        Ok(())
    }

    /// Write the ledger atomically (temp file, then rename)
    pub fn save(&self) -> Result<(), LedgerError> {
        if let Some(dir) = self.ledger_file.parent() {
            fs::create_dir_all(dir).map_err(|e| LedgerError::WriteError(dir.to_path_buf(), e))?;
        }

        let json = serde_json::to_string_pretty(&self.revisions)
            .map_err(|e| LedgerError::ParseError(self.ledger_file.clone(), e.to_string()))?;

        let temp_file = self.ledger_file.with_extension("json.tmp");
        fs::write(&temp_file, &json).map_err(|e| LedgerError::WriteError(temp_file.clone(), e))?;
        fs::rename(&temp_file, &self.ledger_file)
            .map_err(|e| LedgerError::WriteError(self.ledger_file.clone(), e))?;

        debug!("Saved {} revisions", self.revisions.len());
        Ok(())
    }

    /// Record the start of an attempt and return its revision id
    pub fn record_revision(
        &mut self,
        request_hash: &str,
        instruction: &str,
        raw_response: &str,
    ) -> Result<String, LedgerError> {
        let mut revision = Revision::new(request_hash.to_string(), instruction.to_string(), raw_response.to_string());
        while self.get(&revision.id).is_some() {
            revision = Revision::new(request_hash.to_string(), instruction.to_string(), raw_response.to_string());
        }

        let id = revision.id.clone();
        self.revisions.push(revision);
        self.save()?;
        debug!("Recorded revision {}", id);
        Ok(id)
    }

    /// Append a change record to its revision
    pub fn record_change(&mut self, record: ChangeRecord) -> Result<(), LedgerError> {
        let revision = self
            .revisions
            .iter_mut()
            .find(|r| r.id == record.revision_id)
            .ok_or_else(|| LedgerError::RevisionNotFound(record.revision_id.clone()))?;

        debug!("Recorded change to {} under {}", record.file_path.display(), revision.id);
        revision.changes.push(record);
        self.save()
    }

    pub fn get(&self, id: &str) -> Option<&Revision> {
        self.revisions.iter().find(|r| r.id == id)
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn has_active_changes(&self, id: &str) -> bool {
        self.get(id).is_some_and(Revision::has_active_changes)
    }

    /// Undo every active change of a revision, newest first.
    ///
    /// Files the revision created are removed. Returns how many files were
    /// restored; `Ok(0)` when nothing is active.
    pub fn rollback(&mut self, id: &str, project_root: &Path) -> Result<usize, LedgerError> {
        let index = self.index_of(id)?;
        let mut restored = 0;
        let mut failure = None;

        for change in self.revisions[index].changes.iter_mut().rev() {
            if !change.status.is_active() {
                continue;
            }
            let path = project_root.join(&change.file_path);
            let result = if change.existed_before {
                write_file(&path, &change.old_content)
            } else if path.exists() {
                fs::remove_file(&path)
            } else {
                Ok(())
            };

            match result {
                Ok(()) => {
                    change.status = ChangeStatus::Reverted;
                    restored += 1;
                    debug!("Reverted {}", change.file_path.display());
                }
                Err(e) => {
                    failure = Some(LedgerError::RestoreError(path, e));
                    break;
                }
            }
        }

        self.save()?;
        if let Some(err) = failure {
            return Err(err);
        }

        if restored == 0 {
            info!("Revision {} has no active changes; nothing to roll back", id);
        } else {
            info!("Rolled back {} file(s) from revision {}", restored, id);
        }
        Ok(restored)
    }

    /// Re-apply the reverted changes of a revision in write order
    pub fn restore(&mut self, id: &str, project_root: &Path) -> Result<usize, LedgerError> {
        let index = self.index_of(id)?;
        let mut reapplied = 0;
        let mut failure = None;

        for change in self.revisions[index].changes.iter_mut() {
            if change.status.is_active() {
                continue;
            }
            let path = project_root.join(&change.file_path);
            match write_file(&path, &change.new_content) {
                Ok(()) => {
                    change.status = ChangeStatus::Active;
                    reapplied += 1;
                }
                Err(e) => {
                    failure = Some(LedgerError::RestoreError(path, e));
                    break;
                }
            }
        }

        self.save()?;
        match failure {
            Some(err) => Err(err),
            None => {
                if reapplied == 0 {
                    warn!("Revision {} has no reverted changes to restore", id);
                }
                Ok(reapplied)
            }
        }
    }

    fn index_of(&self, id: &str) -> Result<usize, LedgerError> {
        self.revisions
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| LedgerError::RevisionNotFound(id.to_string()))
    }
}

fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request_hash;
    use chrono::Utc;
    use tempfile::TempDir;

    fn change(revision_id: &str, path: &str, old: &str, new: &str, existed_before: bool) -> ChangeRecord {
        ChangeRecord {
            revision_id: revision_id.to_string(),
            file_path: PathBuf::from(path),
            old_content: old.to_string(),
            new_content: new.to_string(),
            existed_before,
            note: "edit".to_string(),
            description: String::new(),
            instruction: "edit".to_string(),
            raw_response: String::new(),
            model_used: "test".to_string(),
            created_at: Utc::now(),
            status: ChangeStatus::Active,
        }
    }

    fn setup() -> (TempDir, RevisionLedger) {
        let temp = TempDir::new().unwrap();
        let ledger = RevisionLedger::open(&temp.path().join(".editloop")).unwrap();
        (temp, ledger)
    }

    #[test]
    fn test_rollback_restores_and_is_idempotent() {
        let (temp, mut ledger) = setup();
        let root = temp.path();
        fs::write(root.join("a.txt"), "hello").unwrap();

        let id = ledger.record_revision(&request_hash("fix"), "fix", "raw").unwrap();
        ledger.record_change(change(&id, "a.txt", "helo", "hello", true)).unwrap();
        assert!(ledger.has_active_changes(&id));

        assert_eq!(ledger.rollback(&id, root).unwrap(), 1);
        assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "helo");
        assert!(!ledger.has_active_changes(&id));

        assert_eq!(ledger.rollback(&id, root).unwrap(), 0);
        assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "helo");
    }

    #[test]
    fn test_rollback_reverse_order_and_new_files() {
        let (temp, mut ledger) = setup();
        let root = temp.path();
        fs::write(root.join("a.txt"), "v2").unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/new.rs"), "fn x() {}").unwrap();

        let id = ledger.record_revision("h", "two writes", "raw").unwrap();
        ledger.record_change(change(&id, "a.txt", "v0", "v1", true)).unwrap();
        ledger.record_change(change(&id, "a.txt", "v1", "v2", true)).unwrap();
        ledger.record_change(change(&id, "src/new.rs", "", "fn x() {}", false)).unwrap();

        assert_eq!(ledger.rollback(&id, root).unwrap(), 3);
        assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "v0");
        assert!(!root.join("src/new.rs").exists());
    }

    #[test]
    fn test_restore_reapplies() {
        let (temp, mut ledger) = setup();
        let root = temp.path();
        let id = ledger.record_revision("h", "i", "r").unwrap();
        ledger.record_change(change(&id, "b.txt", "old", "new", true)).unwrap();
        ledger.rollback(&id, root).unwrap();
        assert_eq!(fs::read_to_string(root.join("b.txt")).unwrap(), "old");

        assert_eq!(ledger.restore(&id, root).unwrap(), 1);
        assert_eq!(fs::read_to_string(root.join("b.txt")).unwrap(), "new");
        assert!(ledger.has_active_changes(&id));
    }

    #[test]
    fn test_unknown_revision() {
        let (temp, mut ledger) = setup();
        assert!(matches!(
            ledger.rollback("nope", temp.path()),
            Err(LedgerError::RevisionNotFound(_))
        ));
        assert!(ledger.record_change(change("nope", "a", "", "", true)).is_err());
        assert!(!ledger.has_active_changes("nope"));
    }

    #[test]
    fn test_persisted_and_reloaded() {
        let (temp, mut ledger) = setup();
        let id = ledger.record_revision("h", "i", "r").unwrap();
        ledger.record_change(change(&id, "a.txt", "", "x", false)).unwrap();

        let state = temp.path().join(".editloop");
        assert!(state.join(LEDGER_FILE).exists());
        assert!(!state.join("revisions.json.tmp").exists());

        let reopened = RevisionLedger::open(&state).unwrap();
        assert_eq!(reopened.revisions().len(), 1);
        assert_eq!(reopened.get(&id).unwrap().changes.len(), 1);
        assert!(reopened.has_active_changes(&id));
    }

    #[test]
    fn test_distinct_ids_for_repeated_requests() {
        let (_temp, mut ledger) = setup();
        let a = ledger.record_revision("h", "i", "r").unwrap();
        let b = ledger.record_revision("h", "i", "r").unwrap();
        assert_ne!(a, b);
    }
}
