//! # Wirebox Protocols
//!
//! Data types and collaborator traits for the wirebox module registry.
//! Contains only definitions, no registry implementation.
//!
//! ## Core Traits
//!
//! - [`ResolverHookFactory`] / [`ResolverHook`] - Narrow resolution candidates
//! - [`EventSink`] - Receive lifecycle events
//! - [`Activator`] - Run module code on start and stop
//! - [`ModuleContent`] - Prepare content when wirings are built

pub mod activator;
pub mod capability;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod filter;
pub mod hook;
pub mod types;

pub use activator::{Activator, ModuleContent, NoopActivator, NoopContent};
pub use capability::{Capability, Requirement, Resolution, VERSION_ATTRIBUTE, directive, namespace};
pub use descriptor::{CapabilitySpec, ModuleDescriptor, RequirementSpec};
pub use error::{
    BoxError, HookError, LockError, ModuleError, ParseError, RegistryError, ResolveError,
    Unsatisfied,
};
pub use event::{EventSink, FrameworkEvent, FrameworkEventKind, ModuleEvent, ModuleEventKind};
pub use filter::{Filter, Operator};
pub use hook::{ResolverHook, ResolverHookFactory, Shrinkable};
pub use types::*;
