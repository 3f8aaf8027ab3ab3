//! Descriptor, version and filter parsing errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid version: {0}")]
    Version(String),

    #[error("Invalid version range: {0}")]
    VersionRange(String),

    #[error("Invalid filter {filter}: {message}")]
    Filter { filter: String, message: String },

    #[error("Invalid descriptor for {module}: {message}")]
    Descriptor { module: String, message: String },
}
