//! Session context
//!
//! Identity of one live connection, created on connect and passed to every
//! later event on that connection.

use std::time::{Duration, Instant};

use serde::Deserialize;

/// Parameters a client supplies when opening the stream
///
/// Taken from the connection URL's query string:
/// `?userId=<id>&convoyId=<id>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Member id (required)
    #[serde(default)]
    pub user_id: Option<String>,

    /// Convoy to join on connect (optional)
    #[serde(default)]
    pub convoy_id: Option<String>,
}

impl ConnectParams {
    /// Create connect parameters
    pub fn new(user_id: impl Into<String>, convoy_id: Option<&str>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            convoy_id: convoy_id.map(str::to_string),
        }
    }
}

/// Context of an accepted connection
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique connection ID
    pub connection_id: u64,

    /// Member the connection speaks for
    pub user_id: String,

    /// Convoy requested at connect time, if any
    pub requested_convoy: Option<String>,

    /// When the connection was accepted
    pub connected_at: Instant,
}

impl SessionContext {
    /// Create a new context
    pub fn new(connection_id: u64, user_id: String, requested_convoy: Option<String>) -> Self {
        Self {
            connection_id,
            user_id,
            requested_convoy,
            connected_at: Instant::now(),
        }
    }

    /// Time since the connection was accepted
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
