use std::path::PathBuf;
use thiserror::Error;

use crate::models::ConfigError;

/// Main error type for editloop
#[derive(Error, Debug)]
pub enum EditLoopError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Revision ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Plan file error: {0}")]
    Plan(#[from] PlanError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Generation failed for {path}: {message}")]
    Generation { path: PathBuf, message: String },

    #[error("Merge conflict in {path} at base lines {start}..{end}: the file changed on disk in the same region as the proposed edit")]
    MergeConflict {
        path: PathBuf,
        start: usize,
        end: usize,
        base: String,
        current: String,
        proposed: String,
    },

    #[error("Review rejected changes to {path} after {attempts} attempt(s): {feedback}")]
    ReviewRejected {
        path: PathBuf,
        feedback: String,
        suggested_prompt: Option<String>,
        attempts: u32,
    },

    #[error("Review kept requesting revisions for {path} after {rounds} round(s): {feedback}")]
    ReviewUnresolved {
        path: PathBuf,
        feedback: String,
        rounds: u32,
    },

    #[error("Step '{path}' failed after {attempts} attempts: {last_failure}")]
    RequirementFailed {
        path: PathBuf,
        instruction: String,
        attempts: u32,
        last_failure: String,
        last_response: Option<String>,
    },

    #[error("Version control error: {0}")]
    Vcs(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Project state folder not found at {0}")]
    StateDirNotFound(PathBuf),
}

impl EditLoopError {
    /// True for failures a retry loop may absorb: the attempt failed, the process did not.
    pub fn is_attempt_failure(&self) -> bool {
        matches!(
            self,
            EditLoopError::Model(_)
                | EditLoopError::Generation { .. }
                | EditLoopError::MergeConflict { .. }
                | EditLoopError::ReviewRejected { .. }
                | EditLoopError::ReviewUnresolved { .. }
        )
    }

    /// Format error together with whatever a human needs to resume manually
    pub fn display_with_context(&self) -> String {
        match self {
            EditLoopError::MergeConflict { path, base, current, proposed, .. } => {
                let mut output = format!("Error: {}\n", self);
                output.push_str(&format!(
                    "\nFile: {}\nBase: {} lines | Current: {} lines | Proposed: {} lines\n",
                    path.display(),
                    base.lines().count(),
                    current.lines().count(),
                    proposed.lines().count()
                ));
                output.push_str("Re-run the edit against the current file content, or resolve by hand.\n");
                output
            }
            EditLoopError::ReviewRejected { feedback, suggested_prompt, .. } => {
                let mut output = format!("Error: {}\n", self);
                if !feedback.is_empty() {
                    output.push_str(&format!("\nReviewer feedback:\n  {}\n", feedback));
                }
                if let Some(prompt) = suggested_prompt {
                    output.push_str(&format!("\nSuggested instruction:\n  {}\n", prompt));
                }
                output
            }
            EditLoopError::RequirementFailed { instruction, last_response, .. } => {
                let mut output = format!("Error: {}\n", self);
                output.push_str(&format!("\nInstruction:\n  {}\n", instruction));
                if let Some(response) = last_response {
                    let preview: String = response.chars().take(400).collect();
                    output.push_str(&format!("\nLast model response (truncated):\n{}\n", preview));
                }
                output.push_str("\nThe plan was saved; rerun `editloop orchestrate` to resume.\n");
                output
            }
            other => format!("Error: {}", other),
        }
    }
}

/// Errors related to the revision ledger file
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to read ledger file {0}: {1}")]
    ReadError(PathBuf, std::io::Error),

    #[error("Failed to write ledger file {0}: {1}")]
    WriteError(PathBuf, std::io::Error),

    #[error("Failed to parse ledger file {0}: {1}")]
    ParseError(PathBuf, String),

    #[error("Revision not found in ledger: {0}")]
    RevisionNotFound(String),

    #[error("Failed to restore {0}: {1}")]
    RestoreError(PathBuf, std::io::Error),
}

/// Errors related to plan persistence
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Failed to read plan file {0}: {1}")]
    ReadError(PathBuf, std::io::Error),

    #[error("Failed to write plan file {0}: {1}")]
    WriteError(PathBuf, std::io::Error),

    #[error("Failed to parse plan file {0}: {1}")]
    ParseError(PathBuf, String),

    #[error("Plan has no requirements")]
    Empty,
}

/// Errors raised while talking to a model
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Stream error: {0}")]
    StreamError(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelError::Timeout(0)
        } else if err.is_connect() {
            ModelError::ConnectionRefused(err.to_string())
        } else if let Some(status) = err.status() {
            ModelError::HttpError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ModelError::RequestFailed(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, EditLoopError>;
