//! Convoy lifecycle
//!
//! Create, join, leave and disconnect cleanup. Membership changes go through
//! here so the member → convoy index always mirrors convoy membership, and a
//! convoy that loses its last member is deleted in the same step.
//!
//! A member is in at most one convoy. Joining a second convoy leaves the first
//! one, with the usual `member_left` notifications.

use crate::protocol::OutboundMessage;

use super::entry::Convoy;
use super::error::RegistryError;
use super::state::{DeliveryReport, RegistryState};

/// Result of removing a member from a convoy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// The member was listed and has been removed
    pub removed: bool,
    /// The convoy became empty and was deleted
    pub deleted: bool,
    /// Notifications sent to the remaining members
    pub notified: DeliveryReport,
}

fn require(value: &str, field: &'static str) -> Result<(), RegistryError> {
    if value.is_empty() {
        Err(RegistryError::MissingField(field))
    } else {
        Ok(())
    }
}

impl RegistryState {
    /// Create a convoy whose sole member is `creator_id`
    ///
    /// Fails if the id is taken. The creator leaves any convoy it was in.
    pub fn create_convoy(
        &mut self,
        convoy_id: &str,
        creator_id: &str,
        name: Option<String>,
    ) -> Result<Convoy, RegistryError> {
        require(convoy_id, "convoyId")?;
        require(creator_id, "creatorId")?;

        if self.convoys.contains_key(convoy_id) {
            return Err(RegistryError::ConvoyAlreadyExists(convoy_id.to_string()));
        }

        self.leave_current_convoy(creator_id);

        let convoy = Convoy::new(convoy_id, creator_id, name);
        self.convoys.insert(convoy_id.to_string(), convoy.clone());
        self.memberships
            .insert(creator_id.to_string(), convoy_id.to_string());

        tracing::info!(convoy_id = %convoy_id, creator_id = %creator_id, "Convoy created");
        Ok(convoy)
    }

    /// Add a member to a convoy
    ///
    /// Joining a convoy the member is already in changes nothing. Returns the
    /// convoy as it stands after the join.
    pub fn join_convoy(&mut self, convoy_id: &str, user_id: &str) -> Result<Convoy, RegistryError> {
        require(convoy_id, "convoyId")?;
        require(user_id, "userId")?;

        if !self.convoys.contains_key(convoy_id) {
            return Err(RegistryError::ConvoyNotFound(convoy_id.to_string()));
        }

        if self.memberships.get(user_id).map(String::as_str) != Some(convoy_id) {
            self.leave_current_convoy(user_id);
        }

        let convoy = self
            .convoys
            .get_mut(convoy_id)
            .ok_or_else(|| RegistryError::ConvoyNotFound(convoy_id.to_string()))?;
        if convoy.add_member(user_id) {
            self.memberships
                .insert(user_id.to_string(), convoy_id.to_string());
            tracing::info!(
                convoy_id = %convoy_id,
                user_id = %user_id,
                members = convoy.member_count(),
                "Member joined convoy"
            );
        }

        Ok(convoy.clone())
    }

    /// Join and tell every member, the newcomer included
    pub fn join_convoy_notify(
        &mut self,
        convoy_id: &str,
        user_id: &str,
    ) -> Result<(Convoy, DeliveryReport), RegistryError> {
        let convoy = self.join_convoy(convoy_id, user_id)?;
        let report = self.notify(
            &convoy.members,
            &OutboundMessage::MemberJoined { convoy_id, user_id },
        );
        Ok((convoy, report))
    }

    /// Remove a member from a convoy
    ///
    /// Leaving a convoy one is not in (or that does not exist) is a no-op.
    /// Remaining members get a `member_left`; an emptied convoy is deleted.
    pub fn leave_convoy(&mut self, convoy_id: &str, user_id: &str) -> LeaveOutcome {
        let mut outcome = LeaveOutcome::default();

        let Some(convoy) = self.convoys.get_mut(convoy_id) else {
            return outcome;
        };
        if !convoy.remove_member(user_id) {
            return outcome;
        }
        outcome.removed = true;

        if self.memberships.get(user_id).map(String::as_str) == Some(convoy_id) {
            self.memberships.remove(user_id);
        }

        if convoy.is_empty() {
            self.convoys.remove(convoy_id);
            outcome.deleted = true;
            tracing::info!(convoy_id = %convoy_id, "Convoy deleted (no members)");
        } else {
            let remaining = convoy.members.clone();
            outcome.notified = self.notify(
                &remaining,
                &OutboundMessage::MemberLeft { convoy_id, user_id },
            );
        }

        tracing::info!(convoy_id = %convoy_id, user_id = %user_id, "Member left convoy");
        outcome
    }

    /// Remove a member from every convoy that lists it
    ///
    /// Scans all convoys rather than trusting the index. Returns the ids of
    /// the convoys the member was removed from.
    pub fn remove_member_everywhere(&mut self, user_id: &str) -> Vec<String> {
        let listed: Vec<String> = self
            .convoys
            .values()
            .filter(|convoy| convoy.has_member(user_id))
            .map(|convoy| convoy.id.clone())
            .collect();

        for convoy_id in &listed {
            self.leave_convoy(convoy_id, user_id);
        }
        self.memberships.remove(user_id);

        listed
    }

    fn leave_current_convoy(&mut self, user_id: &str) {
        if let Some(previous) = self.memberships.get(user_id).cloned() {
            self.leave_convoy(&previous, user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::channel::ChannelHandle;
    use crate::registry::frame::OutboundFrame;

    fn bind(state: &mut RegistryState, user_id: &str) -> mpsc::Receiver<OutboundFrame> {
        let (handle, rx) = ChannelHandle::new(1, 16);
        state.bind_connection(user_id, handle);
        rx
    }

    fn next_json(rx: &mut mpsc::Receiver<OutboundFrame>) -> serde_json::Value {
        let frame = rx.try_recv().expect("expected a frame");
        serde_json::from_str(frame.as_text().unwrap()).unwrap()
    }

    #[test]
    fn test_create_convoy() {
        let mut state = RegistryState::new();
        let convoy = state.create_convoy("g1", "u1", None).unwrap();

        assert_eq!(convoy.members, vec!["u1".to_string()]);
        assert_eq!(state.find_convoy_of("u1").unwrap().id, "g1");
    }

    #[test]
    fn test_create_existing_fails() {
        let mut state = RegistryState::new();
        state.create_convoy("g1", "u1", None).unwrap();
        state.join_convoy("g1", "u2").unwrap();

        let result = state.create_convoy("g1", "u9", None);
        assert_eq!(result, Err(RegistryError::ConvoyAlreadyExists("g1".into())));

        // Existing membership untouched
        assert_eq!(state.convoy("g1").unwrap().member_count(), 2);
    }

    #[test]
    fn test_create_requires_fields() {
        let mut state = RegistryState::new();

        assert_eq!(
            state.create_convoy("", "u1", None),
            Err(RegistryError::MissingField("convoyId"))
        );
        assert_eq!(
            state.create_convoy("g1", "", None),
            Err(RegistryError::MissingField("creatorId"))
        );
        assert_eq!(state.convoy_count(), 0);
    }

    #[test]
    fn test_join_unknown_convoy() {
        let mut state = RegistryState::new();
        assert_eq!(
            state.join_convoy("ghost", "u1"),
            Err(RegistryError::ConvoyNotFound("ghost".into()))
        );
        assert!(state.find_convoy_of("u1").is_none());
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut state = RegistryState::new();
        state.create_convoy("g1", "u1", None).unwrap();

        state.join_convoy("g1", "u2").unwrap();
        let convoy = state.join_convoy("g1", "u2").unwrap();
        state.join_convoy("g1", "u1").unwrap();

        assert_eq!(convoy.members, vec!["u1".to_string(), "u2".to_string()]);
        assert_eq!(state.convoy("g1").unwrap().member_count(), 2);
    }

    #[test]
    fn test_join_moves_member_between_convoys() {
        let mut state = RegistryState::new();
        state.create_convoy("g1", "u1", None).unwrap();
        state.join_convoy("g1", "u2").unwrap();
        state.create_convoy("g2", "u3", None).unwrap();

        state.join_convoy("g2", "u2").unwrap();

        assert_eq!(state.convoy("g1").unwrap().members, vec!["u1".to_string()]);
        assert_eq!(state.find_convoy_of("u2").unwrap().id, "g2");
    }

    #[test]
    fn test_join_last_member_away_deletes_old_convoy() {
        let mut state = RegistryState::new();
        state.create_convoy("g1", "u1", None).unwrap();
        state.create_convoy("g2", "u2", None).unwrap();

        state.join_convoy("g2", "u1").unwrap();

        assert!(state.convoy("g1").is_none());
        assert_eq!(state.convoy("g2").unwrap().member_count(), 2);
    }

    #[test]
    fn test_join_notify_reaches_everyone() {
        let mut state = RegistryState::new();
        state.create_convoy("g1", "u1", None).unwrap();
        let mut rx1 = bind(&mut state, "u1");
        let mut rx2 = bind(&mut state, "u2");

        let (convoy, report) = state.join_convoy_notify("g1", "u2").unwrap();

        assert_eq!(convoy.member_count(), 2);
        assert_eq!(report.delivered, 2);
        for rx in [&mut rx1, &mut rx2] {
            let msg = next_json(rx);
            assert_eq!(msg["type"], "member_joined");
            assert_eq!(msg["convoyId"], "g1");
            assert_eq!(msg["userId"], "u2");
        }
    }

    #[test]
    fn test_leave_notifies_remaining() {
        let mut state = RegistryState::new();
        state.create_convoy("g1", "u1", None).unwrap();
        state.join_convoy("g1", "u2").unwrap();
        state.join_convoy("g1", "u3").unwrap();
        let mut rx1 = bind(&mut state, "u1");
        let mut rx2 = bind(&mut state, "u2");
        // u3 has no channel and is skipped

        let outcome = state.leave_convoy("g1", "u2");

        assert!(outcome.removed);
        assert!(!outcome.deleted);
        assert_eq!(outcome.notified, DeliveryReport { delivered: 1, skipped: 1 });

        let msg = next_json(&mut rx1);
        assert_eq!(msg["type"], "member_left");
        assert_eq!(msg["userId"], "u2");
        assert!(rx2.try_recv().is_err());
        assert!(state.find_convoy_of("u2").is_none());
    }

    #[test]
    fn test_leave_is_idempotent() {
        let mut state = RegistryState::new();
        state.create_convoy("g1", "u1", None).unwrap();
        state.join_convoy("g1", "u2").unwrap();
        let mut rx1 = bind(&mut state, "u1");

        assert!(state.leave_convoy("g1", "u2").removed);
        let _ = next_json(&mut rx1);

        let second = state.leave_convoy("g1", "u2");
        assert_eq!(second, LeaveOutcome::default());
        assert!(rx1.try_recv().is_err());
        assert_eq!(state.convoy("g1").unwrap().members, vec!["u1".to_string()]);
    }

    #[test]
    fn test_last_leave_deletes_convoy() {
        let mut state = RegistryState::new();
        state.create_convoy("g1", "u1", None).unwrap();

        let outcome = state.leave_convoy("g1", "u1");

        assert!(outcome.deleted);
        assert!(state.convoy("g1").is_none());
        assert_eq!(state.convoy_count(), 0);

        // Leaving a deleted convoy is still fine
        assert_eq!(state.leave_convoy("g1", "u1"), LeaveOutcome::default());
    }

    #[test]
    fn test_remove_member_everywhere() {
        let mut state = RegistryState::new();
        state.create_convoy("g1", "u1", None).unwrap();
        state.join_convoy("g1", "u2").unwrap();
        state.create_convoy("g2", "u3", None).unwrap();
        // Bypass the index to list u2 twice
        state.convoys.get_mut("g2").unwrap().add_member("u2");

        let mut left = state.remove_member_everywhere("u2");
        left.sort();

        assert_eq!(left, vec!["g1".to_string(), "g2".to_string()]);
        assert!(!state.convoy("g1").unwrap().has_member("u2"));
        assert!(!state.convoy("g2").unwrap().has_member("u2"));
        assert!(state.find_convoy_of("u2").is_none());
    }

    #[test]
    fn test_membership_never_duplicates() {
        let mut state = RegistryState::new();
        state.create_convoy("g1", "a", None).unwrap();

        for user in ["b", "c", "b", "a", "c", "b"] {
            state.join_convoy("g1", user).unwrap();
            state.leave_convoy("g1", "c");
            state.join_convoy("g1", user).unwrap();
        }

        let members = &state.convoy("g1").unwrap().members;
        let mut unique = members.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), members.len());
    }
}
