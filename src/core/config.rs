use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::EditLoopError;
use crate::models::{Config, CONFIG_FILE};

/// Per-project state folder holding the ledger and the plan
pub const STATE_DIR: &str = ".editloop";

/// Load configuration from the project directory with CLI overrides
pub fn load_config(
    project_root: &Path,
    model: Option<String>,
    url: Option<String>,
    timeout: Option<u64>,
    no_stream: bool,
) -> Result<Config, EditLoopError> {
    let config = Config::load_from_dir(project_root)?.with_overrides(model, url, timeout, no_stream);

    info!(
        "Configuration loaded: model={}, url={}, timeout={}s",
        config.model.model, config.model.url, config.model.timeout_seconds
    );

    Ok(config)
}

/// Nearest ancestor of `start` holding `editloop.toml` or a state folder.
///
/// Falls back to `start` itself so commands work in unconfigured directories.
pub fn find_project_root_from(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILE).is_file() || dir.join(STATE_DIR).is_dir())
        .unwrap_or(start)
        .to_path_buf()
}

/// Project root for the current working directory
pub fn find_project_root() -> Result<PathBuf, EditLoopError> {
    let current_dir = std::env::current_dir()?;
    Ok(find_project_root_from(&current_dir))
}

/// State folder of a project, which must already exist
pub fn require_state_dir(project_root: &Path) -> Result<PathBuf, EditLoopError> {
    let dir = project_root.join(STATE_DIR);
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(EditLoopError::StateDirNotFound(dir))
    }
}
