use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::{load_config, EditSession, OllamaClient};
use crate::error::EditLoopError;
use crate::models::Config;

/// Options for `editloop edit`
#[derive(Debug, Default)]
pub struct EditOptions {
    pub target: PathBuf,
    pub instruction: String,
    /// Try a section edit before regenerating the whole file
    pub partial: bool,
    /// Run the review judge on the result
    pub review: bool,
    /// Print the diff without writing anything
    pub dry_run: bool,
    pub model: Option<String>,
    pub url: Option<String>,
    pub timeout: Option<u64>,
    pub no_stream: bool,
}

/// Session backed by the configured Ollama model
pub async fn open_session(project_root: &Path, config: Config) -> Result<EditSession, EditLoopError> {
    let client = OllamaClient::new(config.model.clone(), config.behavior.stream_output)?;
    if !client.check_model().await? {
        warn!("Model '{}' is not installed; run 'ollama pull {}'", client.model_name(), client.model_name());
    }
    EditSession::new(config, project_root.to_path_buf(), Arc::new(client))
}

/// Apply one instruction to one file
pub async fn run_edit(project_root: &Path, options: EditOptions) -> Result<(), EditLoopError> {
    let mut config = load_config(project_root, options.model, options.url, options.timeout, options.no_stream)?;
    if options.review {
        config.review.enabled = true;
    }
    if options.dry_run {
        config.behavior.dry_run = true;
    }
    let partial = options.partial || config.behavior.partial_edits;
    let dry_run = config.behavior.dry_run;

    let mut session = open_session(project_root, config).await?;
    info!("Editing {}", options.target.display());
    let outcome = if partial {
        session.apply_partial_edit(&options.target, &options.instruction).await?
    } else {
        session.generate_edit(&options.target, &options.instruction).await?
    };

    if outcome.is_empty() {
        println!("No changes proposed for {}.", options.target.display());
        return Ok(());
    }

    println!("{}", outcome.diff);
    if dry_run {
        println!("Dry run: {} file(s) would change.", outcome.files.len());
    } else if let Some(id) = &outcome.revision_id {
        println!("Revision {} changed {} file(s).", id, outcome.files.len());
        println!("Undo with: editloop rollback {}", id);
    }
    Ok(())
}
