//! Resolution and wiring commit errors.

use std::fmt;

use thiserror::Error;

use super::{BoxError, HookError, LockError};
use crate::types::RequirementId;

/// A requirement for which no acceptable provider was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsatisfied {
    pub requirement: RequirementId,
    pub description: String,
    pub cause: Option<String>,
}

impl fmt::Display for Unsatisfied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)?;
        if let Some(cause) = &self.cause {
            write!(f, " [caused by: {}]", cause)?;
        }
        Ok(())
    }
}

fn join(unsatisfied: &[Unsatisfied]) -> String {
    unsatisfied
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Unable to resolve {module}: missing requirement {}", join(.unsatisfied))]
    Unresolved {
        module: String,
        unsatisfied: Vec<Unsatisfied>,
    },

    #[error("Resolver hook prevented resolution of {0}")]
    HookPrevented(String),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("Unable to construct wiring for {module}: {source}")]
    CommitFailed { module: String, source: BoxError },

    #[error("Resolve called from within a resolver hook")]
    NestedResolve,

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl ResolveError {
    /// Requirements reported as unsatisfied, if this is a matching failure.
    pub fn unsatisfied(&self) -> &[Unsatisfied] {
        match self {
            ResolveError::Unresolved { unsatisfied, .. } => unsatisfied,
            _ => &[],
        }
    }
}
