//! Per-module lifecycle errors.

use thiserror::Error;

use super::BoxError;
use crate::types::ModuleState;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Activator start error in module {module}: {source}")]
    Activation { module: String, source: BoxError },

    #[error("Activator stop error in module {module}: {source}")]
    Deactivation { module: String, source: BoxError },

    #[error("Fragment {0} cannot be started or stopped")]
    Fragment(String),

    #[error("Module {module} is {state}; the transition has not finished")]
    Transitioning { module: String, state: ModuleState },

    #[error("Module {module} has start level {level}, above the active start level {active}")]
    StartLevelTooHigh { module: String, level: u32, active: u32 },

    #[error("Invalid start level {0}: level 0 is reserved for the framework")]
    InvalidStartLevel(u32),
}
