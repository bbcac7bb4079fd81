//! Last-known member positions

use std::time::Instant;

use serde::Serialize;

/// Longitude/latitude pair in degrees
pub type Coordinates = [f64; 2];

/// Most recent position reported by a member
///
/// One record per member. A new report replaces the whole record; fields are
/// never merged with the previous one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPosition {
    /// Reporting member
    pub user_id: String,
    /// Geographic coordinates
    pub coordinates: Coordinates,
    /// Speed as reported by the device
    pub velocity: f64,
    /// Heading in degrees
    pub heading: f64,
    /// Milliseconds since the Unix epoch (device time, or server time if absent)
    pub timestamp: i64,
    /// Reported accuracy radius
    pub accuracy: f64,
    /// Whether the member is currently navigating a route
    pub is_on_journey: bool,
    /// Route the member is following, passed through untouched
    pub route_points: Option<Vec<serde_json::Value>>,
    /// When the server stored this record
    #[serde(skip)]
    pub received_at: Instant,
}

impl MemberPosition {
    /// Create a position with every optional field at its default
    pub fn new(user_id: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            user_id: user_id.into(),
            coordinates,
            velocity: 0.0,
            heading: 0.0,
            timestamp: now_millis(),
            accuracy: 0.0,
            is_on_journey: false,
            route_points: None,
            received_at: Instant::now(),
        }
    }

    /// Time since the server stored this record
    pub fn age(&self) -> std::time::Duration {
        self.received_at.elapsed()
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
