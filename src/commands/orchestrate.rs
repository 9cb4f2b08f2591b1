use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::commands::edit::open_session;
use crate::commands::plan::print_plan;
use crate::core::{
    import_plan, load_config, CancelFlag, JsonPlanStore, PlanStore, RequirementProcessor, ShellScriptRunner, STATE_DIR,
};
use crate::error::{EditLoopError, PlanError};

/// Options for `editloop orchestrate`
#[derive(Debug, Default)]
pub struct OrchestrateOptions {
    /// Plan to import; replaces the stored plan
    pub plan: Option<PathBuf>,
    pub model: Option<String>,
    pub url: Option<String>,
    pub timeout: Option<u64>,
    pub no_stream: bool,
}

/// Run the stored (or imported) plan until it completes or a step fails
pub async fn run_orchestration(project_root: &Path, options: OrchestrateOptions) -> Result<(), EditLoopError> {
    let config = load_config(project_root, options.model, options.url, options.timeout, options.no_stream)?;
    let store = JsonPlanStore::new(&project_root.join(STATE_DIR));

    let mut plan = match options.plan {
        Some(path) => {
            let plan = import_plan(&project_root.join(path))?;
            store.save(&plan)?;
            plan
        }
        None => store.load()?.ok_or_else(|| {
            PlanError::ReadError(
                store.path().to_path_buf(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no stored plan, pass --plan <file>"),
            )
        })?,
    };

    if plan.is_complete() {
        println!("Plan '{}' is already complete.", plan.name);
        return Ok(());
    }

    let cancel = CancelFlag::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current attempt");
            handle.cancel();
        }
    });

    let scripts = Arc::new(ShellScriptRunner::new(
        project_root.to_path_buf(),
        Duration::from_secs(config.orchestration.script_timeout_seconds),
    ));
    let session = open_session(project_root, config).await?;
    let mut processor = RequirementProcessor::new(session, Box::new(store), scripts).with_cancel_flag(cancel);

    info!("Starting plan '{}'", plan.name);
    let result = processor.run(&mut plan).await;
    print_plan(&plan, false);
    result
}
