//! Lock acquisition errors.

use thiserror::Error;

use crate::types::{ModuleId, ModuleState};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("Module {module} is {state}, which is not allowed for this operation")]
    InvalidState { module: ModuleId, state: ModuleState },

    #[error("Unable to acquire lock, thread interrupted")]
    Interrupted,

    #[error("Lock is not held by the current thread: {0}")]
    NotOwner(String),
}
