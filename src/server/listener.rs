//! Convoy server listener
//!
//! Binds the HTTP/WebSocket router to a TCP listener and runs it alongside
//! the registry's cleanup task.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::registry::frame::CLOSE_GOING_AWAY;
use crate::registry::{Registry, RegistryConfig};
use crate::server::config::ServerConfig;
use crate::server::http::{build_router, AppState};
use crate::session::ConnectionManager;
use crate::stats::ServerStats;

/// Convoy relay server
pub struct ConvoyServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    stats: Arc<ServerStats>,
    manager: Arc<ConnectionManager>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl ConvoyServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry_config(config, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(config: ServerConfig, registry_config: RegistryConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let registry = Arc::new(Registry::with_config(registry_config));
        let stats = Arc::new(ServerStats::new());
        let manager = Arc::new(ConnectionManager::new(
            Arc::clone(&registry),
            config.broadcast_policy,
            Arc::clone(&stats),
            config.outbound_queue_capacity,
        ));

        Self {
            config,
            registry,
            stats,
            manager,
            connection_semaphore,
        }
    }

    /// Get a reference to the convoy registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Get server statistics
    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Build the router serving this server's state
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            manager: Arc::clone(&self.manager),
            stats: Arc::clone(&self.stats),
            connection_limit: self.connection_semaphore.clone(),
        };
        build_router(state, self.config.cors)
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown every connected member is sent a going-away close frame
    /// before in-flight requests are drained.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            addr = %addr,
            policy = %self.config.broadcast_policy,
            max_connections = self.config.max_connections,
            "Convoy server listening"
        );

        let cleanup_handle = self.registry.spawn_cleanup_task();

        let registry = Arc::clone(&self.registry);
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
                registry
                    .close_all(CLOSE_GOING_AWAY, "Server shutting down")
                    .await;
            })
            .await;

        // Stop cleanup task on shutdown
        cleanup_handle.abort();

        let snapshot = self.stats.snapshot();
        tracing::info!(
            total_connections = snapshot.total_connections,
            position_reports = snapshot.position_reports,
            frames_delivered = snapshot.frames_delivered,
            frames_skipped = snapshot.frames_skipped,
            "Convoy server stopped"
        );

        result.map_err(Into::into)
    }
}
