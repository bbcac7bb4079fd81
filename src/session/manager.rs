//! Connection lifecycle
//!
//! Binds a transport to a member on connect, dispatches the member's
//! messages, and cleans the registry up when the transport goes away. The
//! manager knows nothing about WebSockets: the server feeds it
//! [`ConnectionEvent`]s and drains the returned outbound queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::{DecodeError, InboundMessage, OutboundMessage};
use crate::registry::frame::CLOSE_NORMAL;
use crate::registry::{ChannelHandle, OutboundFrame, Registry, RegistryError};
use crate::relay::{BroadcastPolicy, Relay};
use crate::stats::ServerStats;

use super::context::{ConnectParams, SessionContext};

/// Something that happened on an accepted connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Raw text payload from the client
    Text(String),
    /// Already decoded message
    Message(InboundMessage),
    /// The transport closed or failed
    Disconnected,
}

/// Handles connect, message and disconnect events for every connection
pub struct ConnectionManager {
    registry: Arc<Registry>,
    relay: Relay,
    stats: Arc<ServerStats>,
    next_connection_id: AtomicU64,
    outbound_capacity: usize,
}

impl ConnectionManager {
    /// Create a manager working against `registry`
    pub fn new(
        registry: Arc<Registry>,
        policy: BroadcastPolicy,
        stats: Arc<ServerStats>,
        outbound_capacity: usize,
    ) -> Self {
        let relay = Relay::new(Arc::clone(&registry), policy, Arc::clone(&stats));
        Self {
            registry,
            relay,
            stats,
            next_connection_id: AtomicU64::new(1),
            outbound_capacity,
        }
    }

    /// Get a reference to the registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Accept a connection
    ///
    /// Binds a fresh channel to the member (closing any channel it replaces),
    /// joins the requested convoy if it exists, and queues
    /// `connection_established`. Returns the receiving end of the channel for
    /// the transport's writer.
    pub async fn connect(
        &self,
        params: ConnectParams,
    ) -> Result<(SessionContext, mpsc::Receiver<OutboundFrame>)> {
        let user_id = params
            .user_id
            .filter(|id| !id.is_empty())
            .ok_or(RegistryError::MissingField("userId"))?;
        let requested = params.convoy_id.filter(|id| !id.is_empty());

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (handle, rx) = ChannelHandle::new(connection_id, self.outbound_capacity);
        let ctx = SessionContext::new(connection_id, user_id, requested);

        let mut state = self.registry.write().await;

        if let Some(previous) = state.bind_connection(&ctx.user_id, handle) {
            tracing::info!(
                user_id = %ctx.user_id,
                previous = previous.connection_id(),
                previous_dropped = previous.dropped_count(),
                connection_id,
                "Closing superseded connection"
            );
            previous.close(CLOSE_NORMAL, "Superseded by a newer connection");
        }

        if let Some(convoy_id) = ctx.requested_convoy.as_deref() {
            if let Err(e) = state.join_convoy(convoy_id, &ctx.user_id) {
                tracing::warn!(user_id = %ctx.user_id, error = %e, "Connect-time join ignored");
            }
        }

        let convoy_id = state.find_convoy_of(&ctx.user_id).map(|c| c.id.clone());
        state.notify(
            [&ctx.user_id],
            &OutboundMessage::ConnectionEstablished {
                user_id: &ctx.user_id,
                convoy_id: convoy_id.as_deref(),
                timestamp: chrono::Utc::now(),
            },
        );
        drop(state);

        tracing::info!(
            user_id = %ctx.user_id,
            connection_id,
            convoy_id = convoy_id.as_deref().unwrap_or("none"),
            "Member connected"
        );

        Ok((ctx, rx))
    }

    /// Handle one event on an accepted connection
    pub async fn handle(&self, ctx: &SessionContext, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Text(text) => match InboundMessage::decode(&text) {
                Ok(message) => self.dispatch(ctx, message).await,
                Err(DecodeError::UnknownKind(kind)) => {
                    tracing::warn!(user_id = %ctx.user_id, kind = %kind, "Unknown message type");
                }
                Err(e) => {
                    tracing::warn!(user_id = %ctx.user_id, error = %e, "Dropping malformed message");
                }
            },
            ConnectionEvent::Message(message) => self.dispatch(ctx, message).await,
            ConnectionEvent::Disconnected => {
                self.disconnect(ctx).await;
            }
        }
    }

    /// Route a decoded message
    pub async fn dispatch(&self, ctx: &SessionContext, message: InboundMessage) {
        match message {
            InboundMessage::LocationUpdate(update) => {
                let position = update.into_position(&ctx.user_id);
                self.relay.report(&ctx.user_id, position).await;
            }
            InboundMessage::JoinConvoy { convoy_id } => self.join(ctx, &convoy_id).await,
            InboundMessage::LeaveConvoy { convoy_id } => {
                let outcome = self.registry.write().await.leave_convoy(&convoy_id, &ctx.user_id);
                self.stats.record_delivery(outcome.notified);
            }
        }
    }

    async fn join(&self, ctx: &SessionContext, convoy_id: &str) {
        let mut state = self.registry.write().await;

        match state.join_convoy_notify(convoy_id, &ctx.user_id) {
            Ok((_, report)) => self.stats.record_delivery(report),
            Err(RegistryError::ConvoyNotFound(_)) => {
                tracing::info!(user_id = %ctx.user_id, convoy_id = %convoy_id, "Join for unknown convoy");
                state.notify(
                    [&ctx.user_id],
                    &OutboundMessage::Error {
                        message: "Convoy not found",
                    },
                );
            }
            Err(e) => {
                tracing::warn!(user_id = %ctx.user_id, error = %e, "Dropping join request");
            }
        }
    }

    /// Clean up after a connection
    ///
    /// Unbinds the channel and removes the member from every convoy that
    /// lists it, deleting convoys left empty. A connection that was already
    /// superseded leaves the registry alone. Returns the convoys left.
    pub async fn disconnect(&self, ctx: &SessionContext) -> Vec<String> {
        let mut state = self.registry.write().await;

        if state
            .unbind_connection(&ctx.user_id, ctx.connection_id)
            .is_none()
        {
            tracing::debug!(
                user_id = %ctx.user_id,
                connection_id = ctx.connection_id,
                "Superseded connection closed"
            );
            return Vec::new();
        }

        let left = state.remove_member_everywhere(&ctx.user_id);
        drop(state);

        tracing::info!(
            user_id = %ctx.user_id,
            connection_id = ctx.connection_id,
            convoys = ?left,
            duration_secs = ctx.duration().as_secs(),
            "Member disconnected, cleaned up"
        );
        left
    }
}
