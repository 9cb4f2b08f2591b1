use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use editloop::commands::{
    init_project, rollback_revision, run_edit, run_orchestration, show_plan, show_revisions, EditOptions,
    OrchestrateOptions,
};
use editloop::core::find_project_root;

/// editloop - self-correcting code edits driven by a local Ollama model
#[derive(Parser)]
#[command(name = "editloop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize an editloop project
    Init {
        /// Project directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Apply an instruction to a file
    Edit {
        /// File to edit, relative to the project root
        target: PathBuf,

        /// What to change; may reference #files, #urls, #WS and #SG
        instruction: String,

        /// Edit only the relevant section when one can be found
        #[arg(long)]
        partial: bool,

        /// Have the model review the change, retrying or rolling back on rejection
        #[arg(long)]
        review: bool,

        /// Print the diff without writing files
        #[arg(long)]
        dry_run: bool,

        /// Override the model to use
        #[arg(long)]
        model: Option<String>,

        /// Override the Ollama URL
        #[arg(long)]
        url: Option<String>,

        /// Override the timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Disable streaming output
        #[arg(long)]
        no_stream: bool,
    },

    /// Undo the file changes of a revision
    Rollback {
        /// Revision id (see `editloop revisions`)
        revision: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Run the orchestration plan
    Orchestrate {
        /// Import a plan file (YAML or JSON) before running
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Override the model to use
        #[arg(long)]
        model: Option<String>,

        /// Override the Ollama URL
        #[arg(long)]
        url: Option<String>,

        /// Override the timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Disable streaming output
        #[arg(long)]
        no_stream: bool,
    },

    /// Show the stored orchestration plan
    Plan {
        #[arg(short, long)]
        verbose: bool,
    },

    /// List recorded revisions
    Revisions {
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let result = match cli.command {
        Commands::Init { path } => {
            let project_root = match path {
                Some(path) => path,
                None => std::env::current_dir()?,
            };
            init_project(&project_root)
        }

        Commands::Edit {
            target,
            instruction,
            partial,
            review,
            dry_run,
            model,
            url,
            timeout,
            no_stream,
        } => {
            let project_root = find_project_root()?;
            let options = EditOptions {
                target,
                instruction,
                partial,
                review,
                dry_run,
                model,
                url,
                timeout,
                no_stream,
            };
            run_edit(&project_root, options).await
        }

        Commands::Rollback { revision, yes } => {
            let project_root = find_project_root()?;
            rollback_revision(&project_root, &revision, yes)
        }

        Commands::Orchestrate {
            plan,
            model,
            url,
            timeout,
            no_stream,
        } => {
            let project_root = find_project_root()?;
            let options = OrchestrateOptions {
                plan,
                model,
                url,
                timeout,
                no_stream,
            };
            run_orchestration(&project_root, options).await
        }

        Commands::Plan { verbose } => {
            let project_root = find_project_root()?;
            show_plan(&project_root, verbose)
        }

        Commands::Revisions { verbose } => {
            let project_root = find_project_root()?;
            show_revisions(&project_root, verbose)
        }
    };

    if let Err(e) = result {
        eprintln!("{}", e.display_with_context());
        std::process::exit(1);
    }
    Ok(())
}
