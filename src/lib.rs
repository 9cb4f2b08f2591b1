//! editloop - self-correcting code-editing engine
//!
//! editloop turns a natural-language instruction into a concrete file change:
//! it expands context directives, asks a local Ollama model for an edit,
//! resolves the reply into whole-file content, reconciles it with whatever
//! changed on disk meanwhile, records it so it can be undone, and optionally
//! has the model review its own result.
//!
//! # Architecture
//!
//! - **commands**: CLI command implementations (init, edit, rollback, orchestrate, plan, revisions)
//! - **core**: the engine (directives, section extraction, generation bridge,
//!   merge, revision ledger, review judge, edit session, orchestration)
//! - **models**: Data structures (config, revisions, plans, verdicts)
//! - **error**: Error types

pub mod commands;
pub mod core;
pub mod error;
pub mod models;

pub use error::{EditLoopError, Result};
