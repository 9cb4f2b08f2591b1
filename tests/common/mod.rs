//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

use editloop::core::{ModelConsumer, ModelReply, ScriptOutcome, ScriptRunner};
use editloop::error::ModelError;
use editloop::models::Config;

/// Model that plays back canned replies and records every call.
///
/// A `None` step fails the call; running out of steps fails too.
pub struct ScriptedModel {
    steps: Mutex<VecDeque<Option<String>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Self {
        Self::with_steps(replies.iter().map(|r| Some(r.to_string())).collect())
    }

    pub fn with_steps(steps: Vec<Option<String>>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(context, instruction)` of every call so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelConsumer for ScriptedModel {
    async fn send(
        &self,
        context: &str,
        instruction: &str,
        _target_path: Option<&Path>,
    ) -> Result<ModelReply, ModelError> {
        self.calls
            .lock()
            .unwrap()
            .push((context.to_string(), instruction.to_string()));
        match self.steps.lock().unwrap().pop_front() {
            Some(Some(text)) => Ok(ModelReply {
                text,
                model: "scripted".to_string(),
            }),
            Some(None) => Err(ModelError::ConnectionRefused("scripted failure".to_string())),
            None => Err(ModelError::RequestFailed("no scripted reply left".to_string())),
        }
    }
}

/// Script runner with queued outcomes; succeeds once the queue is empty
#[derive(Default)]
pub struct ScriptedRunner {
    outcomes: Mutex<VecDeque<ScriptOutcome>>,
    runs: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(outcomes: Vec<ScriptOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptRunner for ScriptedRunner {
    async fn run(&self, script: &str) -> ScriptOutcome {
        self.runs.lock().unwrap().push(script.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptOutcome::ok(""))
    }
}

/// Create an empty project directory
pub fn create_test_project() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let project_root = temp_dir.path().to_path_buf();
    (temp_dir, project_root)
}

/// Write a file relative to the project root, creating parent folders
pub fn write_file(project_root: &Path, relative: &str, content: &str) {
    let path = project_root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, content).expect("Failed to write file");
}

pub fn read_file(project_root: &Path, relative: &str) -> String {
    fs::read_to_string(project_root.join(relative)).expect("Failed to read file")
}

/// Config without streaming and with short timeouts
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.model.timeout_seconds = 10;
    config.behavior.stream_output = false;
    config
}

/// Edit block replacing `find` with `replace` in `path`
pub fn edit_block(path: &str, find: &str, replace: &str) -> String {
    format!("FILE: {}\nFIND:\n{}\nREPLACE:\n{}\nEND\n", path, find, replace)
}

pub fn verdict(status: &str, feedback: &str, new_prompt: &str) -> String {
    format!(
        "```json\n{{\"status\": \"{}\", \"feedback\": \"{}\", \"new_prompt\": \"{}\"}}\n```",
        status, feedback, new_prompt
    )
}
