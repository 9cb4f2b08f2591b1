pub mod budget;
pub mod config;
pub mod generation;
pub mod plan;
pub mod review;
pub mod revision;
pub mod section;

pub use budget::*;
pub use config::*;
pub use generation::*;
pub use plan::*;
pub use review::*;
pub use revision::*;
pub use section::*;
