//! Resolver hook registry and per-resolve hook sessions.

mod registry;
mod session;

pub use registry::HookRegistry;
pub use session::HookSession;
