//! Convoy registry implementation
//!
//! The single shared registry every connection and HTTP handler works
//! against.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::config::{RegistryConfig, DEFAULT_CONVOY_CREATOR, DEFAULT_CONVOY_ID};
use super::entry::Convoy;
use super::error::RegistryError;
use super::position::MemberPosition;
use super::state::RegistryState;

/// Central registry for convoys, positions and member channels
///
/// One `RwLock` guards all three mappings. Handlers that mutate take the write
/// guard for the whole operation, including the fan-out that follows, so a
/// broadcast never observes a half-applied membership change and frames for
/// one convoy are queued in the order reports were processed.
pub struct Registry {
    state: RwLock<RegistryState>,

    /// Configuration
    config: RegistryConfig,
}

impl Registry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        let mut state = RegistryState::new();

        if config.seed_default_convoy {
            match state.create_convoy(DEFAULT_CONVOY_ID, DEFAULT_CONVOY_CREATOR, None) {
                Ok(_) => tracing::info!(
                    convoy_id = DEFAULT_CONVOY_ID,
                    creator_id = DEFAULT_CONVOY_CREATOR,
                    "Default convoy created"
                ),
                Err(e) => tracing::warn!(error = %e, "Failed to seed default convoy"),
            }
        }

        Self {
            state: RwLock::new(state),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Shared access to the state
    pub async fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().await
    }

    /// Exclusive access to the state for a read-modify-write sequence
    pub async fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().await
    }

    /// Create a convoy
    pub async fn create_convoy(
        &self,
        convoy_id: &str,
        creator_id: &str,
        name: Option<String>,
    ) -> Result<Convoy, RegistryError> {
        self.write().await.create_convoy(convoy_id, creator_id, name)
    }

    /// Add a member to a convoy without notifying anyone
    pub async fn join_convoy(&self, convoy_id: &str, user_id: &str) -> Result<Convoy, RegistryError> {
        self.write().await.join_convoy(convoy_id, user_id)
    }

    /// Record a position without relaying it
    pub async fn upsert_position(&self, user_id: &str, position: MemberPosition) {
        self.write().await.upsert_position(user_id, position);
    }

    /// Look up a convoy
    pub async fn convoy(&self, convoy_id: &str) -> Option<Convoy> {
        self.read().await.convoy(convoy_id).cloned()
    }

    /// Last-known positions of a convoy's members, keyed by member id
    ///
    /// Members that never reported are omitted.
    pub async fn convoy_locations(
        &self,
        convoy_id: &str,
    ) -> Result<BTreeMap<String, MemberPosition>, RegistryError> {
        let state = self.read().await;
        let convoy = state
            .convoy(convoy_id)
            .ok_or_else(|| RegistryError::ConvoyNotFound(convoy_id.to_string()))?;

        Ok(state
            .positions_for(&convoy.members)
            .into_iter()
            .map(|pos| (pos.user_id.clone(), pos.clone()))
            .collect())
    }

    /// Get total number of convoys
    pub async fn convoy_count(&self) -> usize {
        self.read().await.convoy_count()
    }

    /// Get number of members with a recorded position
    pub async fn position_count(&self) -> usize {
        self.read().await.position_count()
    }

    /// Get number of bound channels
    pub async fn channel_count(&self) -> usize {
        self.read().await.channel_count()
    }

    /// Ask every connected member's writer to close
    pub async fn close_all(&self, code: u16, reason: &'static str) -> usize {
        let closed = self.read().await.close_all(code, reason);
        tracing::info!(connections = closed, "Closing all member channels");
        closed
    }

    /// Run cleanup task once
    ///
    /// Removes positions of members with no channel and no convoy that have
    /// not reported within `stale_position_ttl`.
    pub async fn cleanup(&self) -> usize {
        let evicted = self
            .write()
            .await
            .evict_stale_positions(self.config.stale_position_ttl);

        if evicted > 0 {
            tracing::info!(evicted, "Stale positions removed by cleanup");
        }
        evicted
    }

    /// Spawn background cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.cleanup().await;
            }
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
