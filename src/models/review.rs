use serde::{Deserialize, Serialize};

/// Judge decision for one review call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    NeedsRevision,
    Rejected,
}

impl ReviewStatus {
    /// Parse a loosely formatted status word from a model reply
    pub fn parse_loose(text: &str) -> Option<Self> {
        let normalized = text.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "approved" | "approve" | "pass" | "accepted" => Some(ReviewStatus::Approved),
            "needs_revision" | "needs_revisions" | "revise" | "revision" => {
                Some(ReviewStatus::NeedsRevision)
            }
            "rejected" | "reject" | "fail" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }
}

/// Verdict returned by the review judge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewVerdict {
    pub status: ReviewStatus,
    pub feedback: String,
    /// Instruction suggested by the judge for the next attempt, if any
    pub refined_instruction: Option<String>,
}

impl ReviewVerdict {
    /// Prompt for the next attempt after a rejection: the judge's suggestion,
    /// or feedback folded into the original intent when the suggestion is blank.
    pub fn retry_prompt(&self, original_intent: &str) -> String {
        match self.refined_instruction.as_deref().map(str::trim) {
            Some(prompt) if !prompt.is_empty() => prompt.to_string(),
            _ => format!(
                "{}\n\nA reviewer rejected the previous attempt with this feedback:\n{}\n\nAddress the feedback while completing the original request.",
                original_intent, self.feedback
            ),
        }
    }

    /// Prompt for the next round after `needs_revision`. The rejected change
    /// stays on disk, so the fallback asks to build on the current file.
    pub fn revision_prompt(&self, original_intent: &str) -> String {
        match self.refined_instruction.as_deref().map(str::trim) {
            Some(prompt) if !prompt.is_empty() => prompt.to_string(),
            _ => format!(
                "{}\n\nA reviewer asked for changes to the previous attempt:\n{}\n\nBuild on the current file to address the feedback while completing the original request.",
                original_intent, self.feedback
            ),
        }
    }
}
