use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit status and combined output of one script run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub success: bool,
    pub output: String,
}

impl ScriptOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Runs the plan's setup and validate scripts
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, script: &str) -> ScriptOutcome;
}

/// Runs `bash ./<script>` in the project root
pub struct ShellScriptRunner {
    project_root: PathBuf,
    timeout: Duration,
}

impl ShellScriptRunner {
    pub fn new(project_root: PathBuf, timeout: Duration) -> Self {
        Self { project_root, timeout }
    }
}

#[async_trait]
impl ScriptRunner for ShellScriptRunner {
    async fn run(&self, script: &str) -> ScriptOutcome {
        if !self.project_root.join(script).is_file() {
            debug!("{} not present, treating as success", script);
            return ScriptOutcome::ok("");
        }

        let child = Command::new("bash")
            .arg(format!("./{}", script))
            .current_dir(&self.project_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => return ScriptOutcome::failed(format!("failed to start {}: {}", script, e)),
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let combined = format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
                ScriptOutcome {
                    success: output.status.success(),
                    output: combined,
                }
            }
            Ok(Err(e)) => ScriptOutcome::failed(format!("{} failed to run: {}", script, e)),
            Err(_) => {
                warn!("{} timed out after {}s", script, self.timeout.as_secs());
                ScriptOutcome::failed(format!("{} timed out after {} seconds", script, self.timeout.as_secs()))
            }
        }
    }
}
