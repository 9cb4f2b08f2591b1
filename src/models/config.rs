use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-project configuration file
pub const CONFIG_FILE: &str = "editloop.toml";

/// Configuration loaded from editloop.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
}

/// Model endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Ollama API URL
    #[serde(default = "default_model_url")]
    pub url: String,
    /// Model name to use
    #[serde(default = "default_model")]
    pub model: String,
    /// Timeout in seconds for a single model call
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            url: default_model_url(),
            model: default_model(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_model_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "qwen2.5-coder:14b".to_string()
}

fn default_timeout() -> u64 {
    300
}

/// Limits applied while expanding directives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum lines inlined from a single `#file` directive
    #[serde(default = "default_max_directive_lines")]
    pub max_directive_lines: usize,
    /// Maximum characters of instruction text used as a fallback search query
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    /// Maximum underlying searches per `#SG` directive
    #[serde(default = "default_max_searches")]
    pub max_searches: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_directive_lines: default_max_directive_lines(),
            max_query_chars: default_max_query_chars(),
            max_searches: default_max_searches(),
        }
    }
}

fn default_max_directive_lines() -> usize {
    2000
}

fn default_max_query_chars() -> usize {
    200
}

fn default_max_searches() -> usize {
    2
}

/// Orchestration plan execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Attempts per requirement before the run stops
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Script run after each successful generation
    #[serde(default = "default_setup_script")]
    pub setup_script: String,
    /// Script whose exit status decides whether a requirement is complete
    #[serde(default = "default_validate_script")]
    pub validate_script: String,
    /// Timeout for each script invocation
    #[serde(default = "default_script_timeout")]
    pub script_timeout_seconds: u64,
    /// Ask the model for a search query derived from the failure on retries
    #[serde(default = "default_true")]
    pub search_on_retry: bool,
    /// Wrap source-file instructions with a test-first directive
    #[serde(default)]
    pub test_driven: bool,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            setup_script: default_setup_script(),
            validate_script: default_validate_script(),
            script_timeout_seconds: default_script_timeout(),
            search_on_retry: true,
            test_driven: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_setup_script() -> String {
    "setup.sh".to_string()
}

fn default_validate_script() -> String {
    "validate.sh".to_string()
}

fn default_script_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

/// Review loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Run the review judge after each edit
    #[serde(default)]
    pub enabled: bool,
    /// Rejection-triggered retries before giving up
    #[serde(default = "default_max_rejection_retries")]
    pub max_rejection_retries: u32,
    /// Cap on consecutive needs_revision rounds
    #[serde(default = "default_max_revision_rounds")]
    pub max_revision_rounds: u32,
    /// Roll back the revision when the judge rejects it
    #[serde(default = "default_true")]
    pub rollback_on_reject: bool,
    /// Log verdicts only, never roll back or retry
    #[serde(default)]
    pub advisory_only: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_rejection_retries: default_max_rejection_retries(),
            max_revision_rounds: default_max_revision_rounds(),
            rollback_on_reject: true,
            advisory_only: false,
        }
    }
}

fn default_max_rejection_retries() -> u32 {
    2
}

fn default_max_revision_rounds() -> u32 {
    3
}

/// Behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Show streaming output in terminal
    #[serde(default = "default_true")]
    pub stream_output: bool,
    /// Create parent directories of written files
    #[serde(default = "default_true")]
    pub create_output_dirs: bool,
    /// Compute diffs without writing files or recording changes
    #[serde(default)]
    pub dry_run: bool,
    /// Stage and commit every written file
    #[serde(default)]
    pub auto_commit: bool,
    /// Try section-level edits before whole-file generation
    #[serde(default)]
    pub partial_edits: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            stream_output: true,
            create_output_dirs: true,
            dry_run: false,
            auto_commit: false,
            partial_edits: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))
    }

    /// Try to load config from editloop.toml in the given directory
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge CLI overrides into the config
    pub fn with_overrides(
        mut self,
        model: Option<String>,
        url: Option<String>,
        timeout: Option<u64>,
        no_stream: bool,
    ) -> Self {
        if let Some(m) = model {
            self.model.model = m;
        }
        if let Some(u) = url {
            self.model.url = u;
        }
        if let Some(t) = timeout {
            self.model.timeout_seconds = t;
        }
        if no_stream {
            self.behavior.stream_output = false;
        }
        self
    }

    /// Serialize to the TOML written by `editloop init`
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, std::io::Error),
    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
}
