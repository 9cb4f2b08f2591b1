use std::fs;
use std::path::Path;
use tracing::info;

use crate::core::STATE_DIR;
use crate::error::EditLoopError;
use crate::models::{Config, CONFIG_FILE};

const VALIDATE_TEMPLATE: &str = "#!/usr/bin/env bash\n# Exit non-zero when the project is not in the requested state.\nset -e\n";

/// Create editloop.toml, the state folder and a starter validate script
pub fn init_project(project_root: &Path) -> Result<(), EditLoopError> {
    info!("Initializing editloop project in {}", project_root.display());

    let state_dir = project_root.join(STATE_DIR);
    if !state_dir.exists() {
        fs::create_dir_all(&state_dir)?;
        info!("Created state folder: {}", state_dir.display());
    } else {
        info!("State folder already exists: {}", state_dir.display());
    }

    let config = Config::default();
    create_file_if_not_exists(&project_root.join(CONFIG_FILE), &config.to_toml()?)?;
    create_file_if_not_exists(
        &project_root.join(&config.orchestration.validate_script),
        VALIDATE_TEMPLATE,
    )?;

    print_next_steps(project_root);
    Ok(())
}

fn create_file_if_not_exists(path: &Path, content: &str) -> Result<(), EditLoopError> {
    if !path.exists() {
        fs::write(path, content)?;
        info!("Created file: {}", path.display());
    } else {
        info!("File already exists: {}", path.display());
    }
    Ok(())
}

fn print_next_steps(project_root: &Path) {
    println!("editloop project initialized at {}", project_root.display());
    println!("\nNext steps:");
    println!("1. Edit {} to point at your Ollama model", CONFIG_FILE);
    println!("2. Run 'editloop edit <file> \"<instruction>\"' to make a change");
    println!("3. Run 'editloop revisions' to list changes and 'editloop rollback <id>' to undo one");
    println!("\nTip: reference files inside instructions with #path/to/file or #path:10-40");
}
