//! Connection sessions
//!
//! A session is one accepted streaming connection bound to a member id.

pub mod context;
pub mod manager;

pub use context::{ConnectParams, SessionContext};
pub use manager::{ConnectionEvent, ConnectionManager};
