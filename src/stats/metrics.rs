//! Statistics and metrics for the relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::registry::DeliveryReport;

/// Server-wide counters
///
/// Updated lock-free from connection tasks; read by `/health`.
#[derive(Debug)]
pub struct ServerStats {
    started_at: Instant,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    position_reports: AtomicU64,
    frames_delivered: AtomicU64,
    frames_skipped: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            position_reports: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
        }
    }

    /// A WebSocket session started
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// A WebSocket session ended
    pub fn connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// A position report was processed
    pub fn position_reported(&self) {
        self.position_reports.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for a fan-out
    pub fn record_delivery(&self, report: DeliveryReport) {
        self.frames_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.frames_skipped
            .fetch_add(report.skipped as u64, Ordering::Relaxed);
    }

    /// Open WebSocket sessions
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            position_reports: self.position_reports.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
        }
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of the server counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Time since the server started
    pub uptime: Duration,
    /// Total connections ever
    pub total_connections: u64,
    /// Current open connections
    pub active_connections: u64,
    /// Position reports processed
    pub position_reports: u64,
    /// Frames queued for members
    pub frames_delivered: u64,
    /// Recipients skipped during fan-out
    pub frames_skipped: u64,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"healthy"` while the server runs
    pub status: &'static str,
    /// Open WebSocket sessions
    pub active_connections: u64,
    /// Convoys in the registry
    pub active_convoys: usize,
    /// Members with a recorded position
    pub active_users: usize,
}

impl HealthResponse {
    /// Build a health response from live counters
    pub fn new(active_connections: u64, active_convoys: usize, active_users: usize) -> Self {
        Self {
            status: "healthy",
            active_connections,
            active_convoys,
            active_users,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_stats_new() {
        let stats = ServerStats::new().snapshot();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.position_reports, 0);
        assert_eq!(stats.frames_delivered, 0);
        assert_eq!(stats.frames_skipped, 0);
    }

    #[test]
    fn test_connection_counters() {
        let stats = ServerStats::new();
        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.active_connections, 1);
    }

    #[test]
    fn test_active_connections_never_underflow() {
        let stats = ServerStats::new();
        stats.connection_closed();
        assert_eq!(stats.active_connections(), 0);
    }

    #[test]
    fn test_record_delivery() {
        let stats = ServerStats::new();
        stats.position_reported();
        stats.record_delivery(DeliveryReport {
            delivered: 3,
            skipped: 1,
        });
        stats.record_delivery(DeliveryReport {
            delivered: 2,
            skipped: 0,
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.position_reports, 1);
        assert_eq!(snapshot.frames_delivered, 5);
        assert_eq!(snapshot.frames_skipped, 1);
    }

    #[test]
    fn test_health_serialization() {
        let json = serde_json::to_value(HealthResponse::new(2, 1, 3)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "healthy",
                "activeConnections": 2,
                "activeConvoys": 1,
                "activeUsers": 3,
            })
        );
    }
}
