//! Server configuration

use std::net::SocketAddr;

use crate::relay::BroadcastPolicy;

/// Default listening port
pub const DEFAULT_PORT: u16 = 3000;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent streaming connections (0 = unlimited)
    pub max_connections: usize,

    /// Frames queued per connection before new ones are dropped
    pub outbound_queue_capacity: usize,

    /// What a position report fans out as
    pub broadcast_policy: BroadcastPolicy,

    /// Answer cross-origin requests from any origin
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            outbound_queue_capacity: 256,
            broadcast_policy: BroadcastPolicy::default(),
            cors: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set per-connection outbound queue capacity
    ///
    /// Clamped to at least one frame.
    pub fn outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity.max(1);
        self
    }

    /// Set the broadcast policy
    pub fn broadcast_policy(mut self, policy: BroadcastPolicy) -> Self {
        self.broadcast_policy = policy;
        self
    }

    /// Disable CORS headers
    pub fn disable_cors(mut self) -> Self {
        self.cors = false;
        self
    }
}
