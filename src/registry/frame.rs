//! Outbound frame types
//!
//! Frames are what the registry pushes into a member's channel. A payload is
//! serialized once per fan-out and shared between recipients.

use std::sync::Arc;

use serde::Serialize;

/// WebSocket close code: normal closure
pub const CLOSE_NORMAL: u16 = 1000;

/// WebSocket close code: server going away
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// WebSocket close code: policy violation
pub const CLOSE_POLICY: u16 = 1008;

/// A frame queued for a single connection's writer
///
/// Cheap to clone: text payloads are reference counted, not copied.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Serialized JSON message
    Text(Arc<str>),
    /// Ask the writer to close the connection
    Close {
        /// WebSocket close code
        code: u16,
        /// Human-readable reason
        reason: &'static str,
    },
}

impl OutboundFrame {
    /// Serialize a message into a text frame
    pub fn json<T: Serialize>(message: &T) -> serde_json::Result<Self> {
        let text = serde_json::to_string(message)?;
        Ok(Self::Text(Arc::from(text)))
    }

    /// Create a close frame
    pub fn close(code: u16, reason: &'static str) -> Self {
        Self::Close { code, reason }
    }

    /// Text payload, if this is a text frame
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Close { .. } => None,
        }
    }
}
