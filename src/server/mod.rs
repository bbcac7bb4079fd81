//! HTTP and WebSocket server

pub mod config;
pub mod http;
pub mod listener;
mod ws;

pub use config::ServerConfig;
pub use http::{build_router, AppState};
pub use listener::ConvoyServer;
