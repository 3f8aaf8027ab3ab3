//! Error types for the wirebox protocol layer.

mod hook;
mod lock;
mod module;
mod parse;
mod registry;
mod resolve;

pub use hook::*;
pub use lock::*;
pub use module::*;
pub use parse::*;
pub use registry::*;
pub use resolve::*;

/// Boxed error returned by externally supplied collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
