//! Convoy registry
//!
//! The registry owns all shared state: convoys and their members, each
//! member's last-known position, and each connected member's outbound
//! channel. Every mutation goes through it.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<Registry>
//!                  ┌──────────────────────────────┐
//!                  │ RwLock<RegistryState {       │
//!                  │   convoys:     id → Convoy   │
//!                  │   positions:   user → Pos    │
//!                  │   channels:    user → Handle │
//!                  │   memberships: user → id     │
//!                  │ }>                           │
//!                  └──────────────┬───────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!   [Reporter]               [Member]                [Member]
//!   location_update          writer task             writer task
//!         │                       ▲                       ▲
//!         └──► Relay ──► ChannelHandle::deliver() ────────┘
//! ```
//!
//! # Shared Payloads
//!
//! A fan-out serializes its message once. Each recipient's queue receives a
//! clone of an `Arc<str>`, so the JSON text is reference counted rather than
//! copied per member.

pub mod channel;
pub mod config;
pub mod entry;
pub mod error;
pub mod frame;
pub mod groups;
pub mod position;
pub mod state;
pub mod store;

pub use channel::ChannelHandle;
pub use config::RegistryConfig;
pub use entry::Convoy;
pub use error::{DeliveryFailure, RegistryError};
pub use frame::OutboundFrame;
pub use groups::LeaveOutcome;
pub use position::MemberPosition;
pub use state::{DeliveryReport, RegistryState};
pub use store::Registry;
