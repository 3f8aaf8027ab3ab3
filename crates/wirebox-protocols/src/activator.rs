//! Delegates the registry calls around module activation and wiring.

use crate::error::BoxError;
use crate::types::RevisionRef;

/// Runs module code when a module starts and stops.
///
/// Errors are module-local: they fail the start or stop call that triggered
/// them but never corrupt registry state.
pub trait Activator: Send + Sync {
    fn activate(&self, module: &RevisionRef) -> Result<(), BoxError>;

    fn deactivate(&self, module: &RevisionRef) -> Result<(), BoxError>;

    /// Drop everything the module registered while active. Called after
    /// every stop, including failed activations.
    fn release(&self, _module: &RevisionRef) {}
}

/// Activator that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActivator;

impl Activator for NoopActivator {
    fn activate(&self, _module: &RevisionRef) -> Result<(), BoxError> {
        Ok(())
    }

    fn deactivate(&self, _module: &RevisionRef) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Prepares module content when a wiring is built and releases it when the
/// wiring is disposed.
pub trait ModuleContent: Send + Sync {
    /// Called while a wiring is constructed. An error aborts the whole commit.
    fn attach(&self, host: &RevisionRef, fragments: &[RevisionRef]) -> Result<(), BoxError>;

    fn detach(&self, _host: &RevisionRef) {}
}

/// Content provider with nothing to prepare.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopContent;

impl ModuleContent for NoopContent {
    fn attach(&self, _host: &RevisionRef, _fragments: &[RevisionRef]) -> Result<(), BoxError> {
        Ok(())
    }
}
