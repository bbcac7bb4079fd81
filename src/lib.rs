//! Real-time convoy presence and position relay
//!
//! Members of a convoy stream their positions over a WebSocket; the server
//! keeps the last-known position of every member and fans each report out to
//! the rest of the convoy. A small HTTP surface creates and joins convoys and
//! serves location snapshots.
//!
//! # Example
//!
//! ```no_run
//! use convoy_relay::{ConvoyServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> convoy_relay::Result<()> {
//!     let server = ConvoyServer::new(ServerConfig::default());
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod error;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use registry::{Convoy, MemberPosition, Registry, RegistryConfig, RegistryError};
pub use relay::{BroadcastPolicy, Relay};
pub use server::{ConvoyServer, ServerConfig};
pub use session::{ConnectParams, ConnectionEvent, ConnectionManager};
