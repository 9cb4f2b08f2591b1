pub mod config;
pub mod directives;
pub mod generation;
pub mod ledger;
pub mod merge;
pub mod model;
pub mod ollama;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod review;
pub mod section;
pub mod session;

pub use config::*;
pub use directives::*;
pub use generation::*;
pub use ledger::*;
pub use merge::*;
pub use model::*;
pub use ollama::*;
pub use orchestrator::*;
pub use prompts::*;
pub use review::*;
pub use session::*;
