use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Lifecycle of a recorded file change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// The write is in effect
    Active,
    /// Rolled back to the recorded old content
    Reverted,
}

impl ChangeStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ChangeStatus::Active)
    }
}

/// Audit record of one editing attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    /// Content-derived identifier
    pub id: String,
    /// Hash of the instruction that started the attempt
    pub request_hash: String,
    /// Instruction after directive expansion
    pub instruction: String,
    /// Raw model output for the attempt
    pub raw_response: String,
    pub created_at: DateTime<Utc>,
    /// File changes recorded under this revision, in write order
    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
}

impl Revision {
    pub fn new(request_hash: String, instruction: String, raw_response: String) -> Self {
        let created_at = Utc::now();
        let id = revision_id(&request_hash, &instruction, &raw_response, &created_at);
        Self {
            id,
            request_hash,
            instruction,
            raw_response,
            created_at,
            changes: Vec::new(),
        }
    }

    pub fn has_active_changes(&self) -> bool {
        self.changes.iter().any(|c| c.status.is_active())
    }

    pub fn active_changes(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.changes.iter().filter(|c| c.status.is_active())
    }
}

/// One accepted file write within a revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub revision_id: String,
    pub file_path: PathBuf,
    pub old_content: String,
    pub new_content: String,
    /// Whether the file existed before this write
    #[serde(default = "default_existed")]
    pub existed_before: bool,
    pub note: String,
    #[serde(default)]
    pub description: String,
    pub instruction: String,
    pub raw_response: String,
    pub model_used: String,
    pub created_at: DateTime<Utc>,
    pub status: ChangeStatus,
}

fn default_existed() -> bool {
    true
}

impl ChangeRecord {
    /// Commit message for this change: `"{Add|Update} {path} - {note}"`, then the description
    pub fn commit_message(&self) -> String {
        let verb = if self.existed_before { "Update" } else { "Add" };
        let mut message = format!("{} {} - {}", verb, self.file_path.display(), self.note);
        if !self.description.trim().is_empty() {
            message.push_str("\n\n");
            message.push_str(self.description.trim());
        }
        message
    }
}

/// Split a free-form message into a one-line note and a description
pub fn split_note(message: &str) -> (String, String) {
    let mut lines = message.trim().lines();
    let note = lines.next().unwrap_or_default().trim().to_string();
    let description = lines
        .skip_while(|l| l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (note, description)
}

/// SHA-256 hex digest of an instruction, used to group attempts of the same request
pub fn request_hash(instruction: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(instruction.as_bytes());
    hex::encode(hasher.finalize())
}

fn revision_id(
    request_hash: &str,
    instruction: &str,
    raw_response: &str,
    created_at: &DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request_hash.as_bytes());
    hasher.update(instruction.as_bytes());
    hasher.update(raw_response.as_bytes());
    hasher.update(created_at.to_rfc3339().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}
