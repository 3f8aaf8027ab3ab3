//! Top-level registry error type.

use thiserror::Error;

use super::{HookError, LockError, ModuleError, ParseError, ResolveError};
use crate::types::{ModuleId, Version};

/// Error returned by the public registry API.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Module not found: {0}")]
    NotFound(ModuleId),

    #[error("Module {symbolic_name} {version} is already installed")]
    Duplicate {
        symbolic_name: String,
        version: Version,
    },

    #[error("Resolver hook already registered: {0}")]
    HookAlreadyRegistered(String),

    #[error("Resolver hook not found: {0}")]
    HookNotFound(String),

    #[error("Framework is {0} and cannot accept this operation")]
    FrameworkState(String),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}
