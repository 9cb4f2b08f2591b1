use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Status of one plan requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl RequirementStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, RequirementStatus::Completed)
    }
}

/// One file-level step of an orchestration plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationRequirement {
    pub file_path: PathBuf,
    pub instruction: String,
    #[serde(default)]
    pub status: RequirementStatus,
    /// Why the last attempt failed; fed into the next attempt's prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_failure_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_raw_response: Option<String>,
    /// Attempts made during the most recent run
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrchestrationRequirement {
    pub fn new(file_path: impl Into<PathBuf>, instruction: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            instruction: instruction.into(),
            status: RequirementStatus::Pending,
            validation_failure_context: None,
            last_raw_response: None,
            attempts: 0,
            updated_at: None,
        }
    }

    /// Record a failed attempt without changing status
    pub fn record_failure(&mut self, context: String, raw_response: Option<String>) {
        self.validation_failure_context = Some(context);
        if raw_response.is_some() {
            self.last_raw_response = raw_response;
        }
        self.updated_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.status = RequirementStatus::Completed;
        self.validation_failure_context = None;
        self.updated_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self) {
        self.status = RequirementStatus::Failed;
        self.updated_at = Some(Utc::now());
    }

    /// True when the requirement targets the plan's setup script
    pub fn is_setup_script(&self, setup_script: &str) -> bool {
        self.file_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n == setup_script)
            .unwrap_or(false)
    }
}

/// Ordered list of requirements executed top to bottom
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestrationPlan {
    #[serde(default)]
    pub name: String,
    pub requirements: Vec<OrchestrationRequirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrchestrationPlan {
    pub fn new(name: impl Into<String>, requirements: Vec<OrchestrationRequirement>) -> Self {
        Self {
            name: name.into(),
            requirements,
            updated_at: None,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.requirements.iter().filter(|r| r.status.is_complete()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.requirements.iter().all(|r| r.status.is_complete())
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}
