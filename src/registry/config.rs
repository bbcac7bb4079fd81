//! Registry configuration

use std::time::Duration;

/// Id of the development convoy created when seeding is enabled
pub const DEFAULT_CONVOY_ID: &str = "test123";

/// Creator (and sole initial member) of the development convoy
pub const DEFAULT_CONVOY_CREATOR: &str = "user_1751900887386";

/// Configuration for the convoy registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Create the development convoy on startup
    pub seed_default_convoy: bool,

    /// How long a detached member's last position is kept
    ///
    /// A member is detached when it has no bound channel and belongs to no
    /// convoy. Positions of attached members are never evicted.
    pub stale_position_ttl: Duration,

    /// How often the cleanup task runs
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            seed_default_convoy: false,
            stale_position_ttl: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl RegistryConfig {
    /// Enable or disable the development convoy
    pub fn seed_default_convoy(mut self, enabled: bool) -> Self {
        self.seed_default_convoy = enabled;
        self
    }

    /// Set the TTL for detached positions
    pub fn stale_position_ttl(mut self, ttl: Duration) -> Self {
        self.stale_position_ttl = ttl;
        self
    }

    /// Set the cleanup interval
    ///
    /// Clamped to a non-zero duration.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval.max(Duration::from_millis(1));
        self
    }
}
