//! Resolver hook errors.

use thiserror::Error;

use super::BoxError;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("Resolver hook {hook} rejected the operation: {source}")]
    Rejected { hook: String, source: BoxError },

    #[error("Resolver hook service unregistered during resolve: {0}")]
    Unregistered(String),
}
