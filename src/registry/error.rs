//! Registry error types
//!
//! Error types for convoy registry operations.

use thiserror::Error;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Convoy not found
    #[error("Convoy not found: {0}")]
    ConvoyNotFound(String),
    /// Convoy id is already taken
    #[error("Convoy already exists: {0}")]
    ConvoyAlreadyExists(String),
    /// A required field was absent or empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Reason an outbound frame could not be handed to a member's channel
///
/// Never surfaced to clients; the relay counts and logs these and moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    /// The member has no bound channel
    #[error("no bound channel")]
    NoChannel,
    /// The channel's writer has gone away
    #[error("channel closed")]
    Closed,
    /// The channel's outbound queue is full
    #[error("channel full")]
    Full,
}
