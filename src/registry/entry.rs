//! Convoy record
//!
//! This module defines the per-convoy state stored in the registry.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A convoy: a named set of members who see each other's positions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Convoy {
    /// Unique convoy id
    pub id: String,

    /// Display name
    pub name: String,

    /// Member who created the convoy
    pub creator_id: String,

    /// Member ids, each present at most once, in join order
    pub members: Vec<String>,

    /// When the convoy was created
    pub created_at: DateTime<Utc>,

    /// Active flag
    pub is_active: bool,
}

impl Convoy {
    /// Create a convoy whose sole member is its creator
    ///
    /// Without an explicit name the convoy is called `Convoy <id>`.
    pub fn new(id: impl Into<String>, creator_id: impl Into<String>, name: Option<String>) -> Self {
        let id = id.into();
        let creator_id = creator_id.into();
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Convoy {}", id));

        Self {
            members: vec![creator_id.clone()],
            id,
            name,
            creator_id,
            created_at: Utc::now(),
            is_active: true,
        }
    }

    /// Check membership
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    /// Add a member
    ///
    /// Returns `false` if the member was already present.
    pub fn add_member(&mut self, user_id: &str) -> bool {
        if self.has_member(user_id) {
            return false;
        }
        self.members.push(user_id.to_string());
        true
    }

    /// Remove a member
    ///
    /// Returns `false` if the member was not present.
    pub fn remove_member(&mut self, user_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != user_id);
        self.members.len() != before
    }

    /// Number of members
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// A convoy with no members is deleted immediately
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
