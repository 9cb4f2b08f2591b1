pub mod edit;
pub mod init;
pub mod orchestrate;
pub mod plan;
pub mod revisions;
pub mod rollback;

pub use edit::*;
pub use init::*;
pub use orchestrate::*;
pub use plan::*;
pub use revisions::*;
pub use rollback::*;
