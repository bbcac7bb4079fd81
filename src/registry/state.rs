//! Registry state
//!
//! The three mappings the relay runs on: convoys, last-known positions and
//! member channels, plus a member → convoy index kept in step with convoy
//! membership. Everything here is synchronous; [`Registry`](super::Registry)
//! puts the whole struct behind a single lock so any read-modify-write
//! sequence is one critical section.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use super::channel::ChannelHandle;
use super::entry::Convoy;
use super::error::DeliveryFailure;
use super::frame::OutboundFrame;
use super::position::MemberPosition;

/// Outcome of a best-effort fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Frames queued on a recipient's channel
    pub delivered: usize,
    /// Recipients skipped (no channel, closed, or full)
    pub skipped: usize,
}

/// Convoys, positions and channels
#[derive(Debug, Default)]
pub struct RegistryState {
    /// Convoy id → convoy
    pub(super) convoys: HashMap<String, Convoy>,

    /// Member id → last reported position
    pub(super) positions: HashMap<String, MemberPosition>,

    /// Member id → outbound channel
    pub(super) channels: HashMap<String, ChannelHandle>,

    /// Member id → id of the convoy listing it
    pub(super) memberships: HashMap<String, String>,
}

impl RegistryState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a member's position, replacing any previous one
    ///
    /// Returns the replaced record.
    pub fn upsert_position(
        &mut self,
        user_id: &str,
        mut position: MemberPosition,
    ) -> Option<MemberPosition> {
        position.user_id = user_id.to_string();
        self.positions.insert(user_id.to_string(), position)
    }

    /// Last recorded position of a member
    pub fn position(&self, user_id: &str) -> Option<&MemberPosition> {
        self.positions.get(user_id)
    }

    /// Recorded positions for the given members, in the given order
    ///
    /// Members without a position are omitted.
    pub fn positions_for<'a, I>(&'a self, user_ids: I) -> Vec<&'a MemberPosition>
    where
        I: IntoIterator<Item = &'a String>,
    {
        user_ids
            .into_iter()
            .filter_map(|id| self.positions.get(id))
            .collect()
    }

    /// Convoy the member belongs to, if any
    pub fn find_convoy_of(&self, user_id: &str) -> Option<&Convoy> {
        self.memberships
            .get(user_id)
            .and_then(|convoy_id| self.convoys.get(convoy_id))
    }

    /// Look up a convoy
    pub fn convoy(&self, convoy_id: &str) -> Option<&Convoy> {
        self.convoys.get(convoy_id)
    }

    /// Bind a channel to a member
    ///
    /// Returns the handle this one replaced. The caller decides what to do
    /// with it; the registry no longer delivers to it.
    pub fn bind_connection(&mut self, user_id: &str, handle: ChannelHandle) -> Option<ChannelHandle> {
        self.channels.insert(user_id.to_string(), handle)
    }

    /// Remove a member's channel binding
    ///
    /// Only removes the binding if it still belongs to `connection_id`, so a
    /// superseded connection going away cannot unbind its replacement.
    pub fn unbind_connection(&mut self, user_id: &str, connection_id: u64) -> Option<ChannelHandle> {
        match self.channels.get(user_id) {
            Some(handle) if handle.connection_id() == connection_id => self.channels.remove(user_id),
            _ => None,
        }
    }

    /// Current channel of a member
    pub fn channel(&self, user_id: &str) -> Option<&ChannelHandle> {
        self.channels.get(user_id)
    }

    /// Queue a frame on one member's channel
    pub fn deliver_to(&self, user_id: &str, frame: OutboundFrame) -> Result<(), DeliveryFailure> {
        let handle = self.channels.get(user_id).ok_or(DeliveryFailure::NoChannel)?;
        if !handle.is_writable() {
            return Err(DeliveryFailure::Closed);
        }
        handle.deliver(frame)
    }

    /// Serialize `message` once and queue it for every recipient
    ///
    /// Best-effort: a recipient without a usable channel is skipped and does
    /// not affect delivery to the others.
    pub fn notify<'a, I, T>(&self, recipients: I, message: &T) -> DeliveryReport
    where
        I: IntoIterator<Item = &'a String>,
        T: Serialize,
    {
        let frame = match OutboundFrame::json(message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize outbound message");
                return DeliveryReport::default();
            }
        };

        let mut report = DeliveryReport::default();
        for user_id in recipients {
            match self.deliver_to(user_id, frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(reason) => {
                    report.skipped += 1;
                    tracing::trace!(user_id = %user_id, %reason, "Skipped recipient");
                }
            }
        }
        report
    }

    /// Ask every bound channel to close
    pub fn close_all(&self, code: u16, reason: &'static str) -> usize {
        for handle in self.channels.values() {
            handle.close(code, reason);
        }
        self.channels.len()
    }

    /// Drop positions of detached members that have not reported for `ttl`
    ///
    /// A member is detached when it has no channel and no convoy.
    pub fn evict_stale_positions(&mut self, ttl: Duration) -> usize {
        let before = self.positions.len();
        let channels = &self.channels;
        let memberships = &self.memberships;

        self.positions.retain(|user_id, position| {
            channels.contains_key(user_id)
                || memberships.contains_key(user_id)
                || position.age() < ttl
        });

        before - self.positions.len()
    }

    /// Number of convoys
    pub fn convoy_count(&self) -> usize {
        self.convoys.len()
    }

    /// Number of members with a recorded position
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of bound channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn bind(state: &mut RegistryState, user_id: &str, connection_id: u64) -> mpsc::Receiver<OutboundFrame> {
        let (handle, rx) = ChannelHandle::new(connection_id, 8);
        state.bind_connection(user_id, handle);
        rx
    }

    #[test]
    fn test_upsert_overwrites() {
        let mut state = RegistryState::new();

        let mut first = MemberPosition::new("u1", [1.0, 2.0]);
        first.velocity = 30.0;
        first.is_on_journey = true;
        state.upsert_position("u1", first);

        let second = MemberPosition::new("u1", [3.0, 4.0]);
        let replaced = state.upsert_position("u1", second.clone());

        assert!(replaced.is_some());
        let stored = state.position("u1").unwrap();
        assert_eq!(stored, &second);
        // Not merged with the first report
        assert_eq!(stored.velocity, 0.0);
        assert!(!stored.is_on_journey);
        assert_eq!(state.position_count(), 1);
    }

    #[test]
    fn test_positions_for_omits_missing() {
        let mut state = RegistryState::new();
        state.upsert_position("a", MemberPosition::new("a", [1.0, 1.0]));
        state.upsert_position("c", MemberPosition::new("c", [3.0, 3.0]));

        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let found: Vec<&str> = state
            .positions_for(&ids)
            .into_iter()
            .map(|p| p.user_id.as_str())
            .collect();

        assert_eq!(found, vec!["a", "c"]);
    }

    #[test]
    fn test_unbind_requires_matching_connection() {
        let mut state = RegistryState::new();
        let _rx1 = bind(&mut state, "u1", 1);
        let _rx2 = bind(&mut state, "u1", 2);

        // The superseded connection cannot remove the new binding
        assert!(state.unbind_connection("u1", 1).is_none());
        assert_eq!(state.channel("u1").unwrap().connection_id(), 2);

        assert!(state.unbind_connection("u1", 2).is_some());
        assert!(state.channel("u1").is_none());
    }

    #[tokio::test]
    async fn test_notify_skips_unusable_channels() {
        let mut state = RegistryState::new();
        let mut rx_a = bind(&mut state, "a", 1);
        let rx_b = bind(&mut state, "b", 2);
        drop(rx_b);

        let recipients = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let report = state.notify(&recipients, &serde_json::json!({"type": "ping"}));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(rx_a.recv().await.unwrap().as_text(), Some(r#"{"type":"ping"}"#));
    }

    #[test]
    fn test_deliver_to_without_channel() {
        let state = RegistryState::new();
        assert_eq!(
            state.deliver_to("nobody", OutboundFrame::json(&1).unwrap()),
            Err(DeliveryFailure::NoChannel)
        );
    }

    #[test]
    fn test_evict_only_detached_positions() {
        let mut state = RegistryState::new();
        let _rx = bind(&mut state, "online", 1);
        state.upsert_position("online", MemberPosition::new("online", [0.0, 0.0]));
        state.upsert_position("gone", MemberPosition::new("gone", [0.0, 0.0]));

        assert_eq!(state.evict_stale_positions(Duration::ZERO), 1);
        assert!(state.position("online").is_some());
        assert!(state.position("gone").is_none());
    }

    #[tokio::test]
    async fn test_close_all() {
        let mut state = RegistryState::new();
        let mut rx = bind(&mut state, "u1", 1);

        assert_eq!(state.close_all(1001, "Server shutting down"), 1);
        assert!(matches!(rx.recv().await, Some(OutboundFrame::Close { code: 1001, .. })));
    }
}
