//! Position relay
//!
//! Turns one position report into zero or more deliveries. The report is
//! always recorded; it is only broadcast if the reporter is in a convoy.
//!
//! Two broadcast policies are supported:
//!
//! - [`BroadcastPolicy::FullSnapshot`]: every member, the reporter included,
//!   receives `all_member_locations` with the position of every member that
//!   has one.
//! - [`BroadcastPolicy::Delta`]: every member except the reporter receives
//!   `member_location_update` with only the reporter's new position.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::protocol::OutboundMessage;
use crate::registry::{DeliveryReport, MemberPosition, Registry, RegistryState};
use crate::stats::ServerStats;

/// What a position report fans out as
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BroadcastPolicy {
    /// Whole convoy snapshot to every member
    #[default]
    FullSnapshot,
    /// Reporter's position to every other member
    Delta,
}

impl FromStr for BroadcastPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snapshot" | "full" | "full-snapshot" => Ok(Self::FullSnapshot),
            "delta" => Ok(Self::Delta),
            other => Err(format!(
                "unknown broadcast policy '{}' (expected 'snapshot' or 'delta')",
                other
            )),
        }
    }
}

impl fmt::Display for BroadcastPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullSnapshot => write!(f, "snapshot"),
            Self::Delta => write!(f, "delta"),
        }
    }
}

/// Result of relaying one report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Convoy the report was broadcast to, if any
    pub convoy_id: Option<String>,
    /// Fan-out result
    pub delivery: DeliveryReport,
}

/// Record a report and fan it out under `policy`
///
/// Runs entirely under the caller's exclusive borrow of the state.
pub fn relay_position(
    state: &mut RegistryState,
    policy: BroadcastPolicy,
    user_id: &str,
    position: MemberPosition,
) -> RelayOutcome {
    state.upsert_position(user_id, position);

    let Some(convoy) = state.find_convoy_of(user_id) else {
        tracing::debug!(user_id = %user_id, "Reporter not in any convoy, position stored only");
        return RelayOutcome::default();
    };

    let delivery = match policy {
        BroadcastPolicy::FullSnapshot => {
            let locations = state.positions_for(&convoy.members);
            tracing::trace!(
                convoy_id = %convoy.id,
                members = convoy.member_count(),
                locations = locations.len(),
                "Broadcasting convoy snapshot"
            );
            state.notify(
                &convoy.members,
                &OutboundMessage::AllMemberLocations {
                    convoy_id: &convoy.id,
                    locations,
                },
            )
        }
        BroadcastPolicy::Delta => match state.position(user_id) {
            Some(location) => state.notify(
                convoy.members.iter().filter(|m| m.as_str() != user_id),
                &OutboundMessage::MemberLocationUpdate {
                    convoy_id: &convoy.id,
                    location,
                },
            ),
            None => DeliveryReport::default(),
        },
    };

    RelayOutcome {
        convoy_id: Some(convoy.id.clone()),
        delivery,
    }
}

/// Relays position reports through the shared registry
#[derive(Clone)]
pub struct Relay {
    registry: Arc<Registry>,
    policy: BroadcastPolicy,
    stats: Arc<ServerStats>,
}

impl Relay {
    /// Create a relay
    pub fn new(registry: Arc<Registry>, policy: BroadcastPolicy, stats: Arc<ServerStats>) -> Self {
        Self {
            registry,
            policy,
            stats,
        }
    }

    /// Record `position` for `user_id` and broadcast it to the reporter's convoy
    pub async fn report(&self, user_id: &str, position: MemberPosition) -> RelayOutcome {
        let [lng, lat] = position.coordinates;
        tracing::debug!(user_id = %user_id, lng, lat, "Location update");

        let outcome = {
            let mut state = self.registry.write().await;
            relay_position(&mut state, self.policy, user_id, position)
        };

        self.stats.position_reported();
        self.stats.record_delivery(outcome.delivery);
        outcome
    }
}
