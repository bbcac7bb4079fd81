//! Crate error type

use thiserror::Error;

use crate::registry::RegistryError;

/// Errors surfaced by the relay server
#[derive(Debug, Error)]
pub enum Error {
    /// Convoy lifecycle failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Socket or listener failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type used across the crate
pub type Result<T> = std::result::Result<T, Error>;
