//! Wire protocol for the streaming surface

pub mod message;

pub use message::{DecodeError, InboundMessage, LocationUpdate, OutboundMessage};
