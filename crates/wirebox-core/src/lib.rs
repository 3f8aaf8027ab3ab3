//! # Wirebox Core
//!
//! The wirebox module registry.
//!
//! ## Components
//!
//! - [`Framework`] - Installs modules, resolves them and drives their lifecycle
//! - [`Resolver`] - Computes wires for a set of revisions against a [`ResolverState`]
//! - [`CapabilitySet`] - Namespace-indexed capability lookup
//! - [`LockManager`] - Per-module and global locks with promotion
//! - [`HookRegistry`] - Registered resolver hook factories
//!
//! ## Resolution
//!
//! A resolve call runs one hook session, computes a wire map for every
//! revision it can, and commits the map atomically: either every wiring is
//! published or none is.

pub mod capability_set;
pub mod dependencies;
pub mod events;
pub mod framework;
pub mod hooks;
pub mod install_lock;
pub mod lock;
pub mod module;
pub mod resolver;
pub mod revision;
pub mod wiring;

pub use capability_set::CapabilitySet;
pub use events::TracingEventSink;
pub use framework::{
    Framework, FrameworkBuilder, FrameworkSettings, FrameworkState, ShutdownSignal, StartOptions,
    StopOptions,
};
pub use hooks::{HookRegistry, HookSession};
pub use lock::LockManager;
pub use module::Module;
pub use resolver::{AdmissiblePredicate, DynamicResolution, Resolver, ResolverState, WireMap};
pub use revision::Revision;
pub use wiring::{Wire, Wiring};
