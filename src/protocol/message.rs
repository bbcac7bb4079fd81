//! Streaming message types
//!
//! Every message is a JSON object tagged by its `type` field.
//!
//! Inbound (client → server): `location_update`, `join_convoy`, `leave_convoy`.
//!
//! Outbound (server → client): `connection_established`,
//! `all_member_locations`, `member_location_update`, `member_joined`,
//! `member_left`, `error`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::registry::position::{now_millis, Coordinates, MemberPosition};

/// Kinds the server understands
const KNOWN_KINDS: &[&str] = &["location_update", "join_convoy", "leave_convoy"];

/// Message received from a connected member
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Position report
    LocationUpdate(LocationUpdate),
    /// Request to join a convoy
    #[serde(rename_all = "camelCase")]
    JoinConvoy {
        /// Target convoy
        convoy_id: String,
    },
    /// Request to leave a convoy
    #[serde(rename_all = "camelCase")]
    LeaveConvoy {
        /// Convoy to leave
        convoy_id: String,
    },
}

/// Why an inbound payload was not turned into a message
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not JSON, or not the structure its kind requires
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// No `type` field
    #[error("message has no type")]
    MissingKind,
    /// A `type` the server does not handle
    #[error("unknown message type: {0}")]
    UnknownKind(String),
}

impl InboundMessage {
    /// Decode a text payload
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(DecodeError::MissingKind)?;
        if !KNOWN_KINDS.contains(&kind) {
            return Err(DecodeError::UnknownKind(kind.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }
}

/// Body of a `location_update` message
///
/// Only `coordinates` is required. Missing numeric fields become zero, a
/// missing (or zero) timestamp becomes the server's clock.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    /// Longitude/latitude pair
    pub coordinates: Coordinates,
    /// Speed
    #[serde(default)]
    pub velocity: Option<f64>,
    /// Heading in degrees
    #[serde(default)]
    pub heading: Option<f64>,
    /// Device timestamp in milliseconds
    #[serde(default, deserialize_with = "lenient_millis")]
    pub timestamp: Option<i64>,
    /// Accuracy radius
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// Navigation flag
    #[serde(default)]
    pub is_on_journey: Option<bool>,
    /// Route being followed
    #[serde(default)]
    pub route_points: Option<Vec<serde_json::Value>>,
}

impl LocationUpdate {
    /// Build the stored position record for `user_id`
    pub fn into_position(self, user_id: &str) -> MemberPosition {
        let mut position = MemberPosition::new(user_id, self.coordinates);
        position.velocity = self.velocity.unwrap_or(0.0);
        position.heading = self.heading.unwrap_or(0.0);
        position.timestamp = self
            .timestamp
            .filter(|ts| *ts != 0)
            .unwrap_or_else(now_millis);
        position.accuracy = self.accuracy.unwrap_or(0.0);
        position.is_on_journey = self.is_on_journey.unwrap_or(false);
        position.route_points = self.route_points;
        position
    }
}

/// Some clients send fractional milliseconds; anything that is not a number
/// counts as absent
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)))
}

/// Message sent to a connected member
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage<'a> {
    /// Acknowledges a new connection
    #[serde(rename_all = "camelCase")]
    ConnectionEstablished {
        /// Connected member
        user_id: &'a str,
        /// Convoy the member is in after connecting
        convoy_id: Option<&'a str>,
        /// Server time
        timestamp: DateTime<Utc>,
    },
    /// Every recorded position in the convoy
    #[serde(rename_all = "camelCase")]
    AllMemberLocations {
        /// Convoy
        convoy_id: &'a str,
        /// Positions of members that have one
        locations: Vec<&'a MemberPosition>,
    },
    /// One member's new position
    #[serde(rename_all = "camelCase")]
    MemberLocationUpdate {
        /// Convoy
        convoy_id: &'a str,
        /// The reporter's position
        location: &'a MemberPosition,
    },
    /// A member joined the convoy
    #[serde(rename_all = "camelCase")]
    MemberJoined {
        /// Convoy
        convoy_id: &'a str,
        /// Joining member
        user_id: &'a str,
    },
    /// A member left the convoy
    #[serde(rename_all = "camelCase")]
    MemberLeft {
        /// Convoy
        convoy_id: &'a str,
        /// Departing member
        user_id: &'a str,
    },
    /// Request could not be served
    Error {
        /// Description
        message: &'a str,
    },
}
