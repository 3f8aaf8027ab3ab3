//! Data types shared by the registry core and its collaborators.

mod attribute;
mod ids;
mod revision;
mod state;
mod version;

pub use attribute::*;
pub use ids::*;
pub use revision::*;
pub use state::*;
pub use version::*;
