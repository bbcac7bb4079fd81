//! Server statistics

pub mod metrics;

pub use metrics::{HealthResponse, ServerStats, StatsSnapshot};
