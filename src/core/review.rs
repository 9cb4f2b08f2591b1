//! Review judge: asks the model whether a diff satisfies the request.

use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::model::ModelConsumer;
use crate::core::prompts::{assemble_review_prompt, SYSTEM_PROMPT_REVIEW};
use crate::error::ModelError;
use crate::models::{ReviewStatus, ReviewVerdict};

static JSON_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*\n(\{.*?\})\s*\n```").expect("valid json fence regex"));

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*\**(status|feedback|new_prompt|suggested_prompt)\**\s*:\s*(.*)$").expect("valid field regex")
});

#[derive(Debug, Deserialize)]
struct RawVerdict {
    status: String,
    #[serde(default)]
    feedback: String,
    #[serde(default, alias = "suggested_prompt", alias = "refined_instruction")]
    new_prompt: Option<String>,
}

/// One model call per review, parsed into a [`ReviewVerdict`]
pub struct ReviewJudge {
    model: Arc<dyn ModelConsumer>,
    timeout: Duration,
}

impl ReviewJudge {
    pub fn new(model: Arc<dyn ModelConsumer>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub async fn judge(
        &self,
        diff: &str,
        original_intent: &str,
        processed_instruction: &str,
        target: Option<&Path>,
    ) -> Result<ReviewVerdict, ModelError> {
        let prompt = assemble_review_prompt(original_intent, processed_instruction, diff);
        let reply = tokio::time::timeout(self.timeout, self.model.send(SYSTEM_PROMPT_REVIEW, &prompt, target))
            .await
            .map_err(|_| ModelError::Timeout(self.timeout.as_secs()))??;

        let verdict = parse_verdict(&reply.text)
            .ok_or_else(|| ModelError::ParseError(format!("no review status in reply: {}", preview(&reply.text))))?;
        info!("Review verdict: {:?}", verdict.status);
        debug!("Review feedback: {}", verdict.feedback);
        Ok(verdict)
    }
}

/// Parse a judge reply: fenced or bare JSON first, then `STATUS:` lines
pub fn parse_verdict(text: &str) -> Option<ReviewVerdict> {
    json_verdict(text).or_else(|| line_verdict(text))
}

fn json_verdict(text: &str) -> Option<ReviewVerdict> {
    let candidate = JSON_FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .or_else(|| {
            let start = text.find('{')?;
            let end = text.rfind('}')?;
            (end > start).then(|| &text[start..=end])
        })?;

    let raw: RawVerdict = serde_json::from_str(candidate).ok()?;
    Some(ReviewVerdict {
        status: ReviewStatus::parse_loose(&raw.status)?,
        feedback: raw.feedback.trim().to_string(),
        refined_instruction: non_blank(raw.new_prompt),
    })
}

fn line_verdict(text: &str) -> Option<ReviewVerdict> {
    let mut status = None;
    let mut feedback = String::new();
    let mut prompt = None;

    for caps in FIELD_RE.captures_iter(text) {
        let value = caps[2].trim().trim_matches('"').to_string();
        match caps[1].to_lowercase().as_str() {
            "status" => status = status.or_else(|| ReviewStatus::parse_loose(&value)),
            "feedback" => feedback = value,
            _ => prompt = Some(value),
        }
    }

    Some(ReviewVerdict {
        status: status?,
        feedback,
        refined_instruction: non_blank(prompt),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}
