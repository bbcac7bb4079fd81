//! WebSocket sessions
//!
//! Each accepted socket is split in two. A writer task drains the member's
//! outbound queue into the sink; the reader loop feeds inbound frames to the
//! [`ConnectionManager`](crate::session::ConnectionManager) until the peer
//! goes away or the writer stops.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::registry::frame::CLOSE_POLICY;
use crate::registry::OutboundFrame;
use crate::session::{ConnectParams, ConnectionEvent};

use super::http::{error_response, AppState};

/// Upgrade a request into a member session
///
/// Refused with 503 when the connection limit is reached.
pub(super) fn accept(upgrade: WebSocketUpgrade, params: ConnectParams, state: AppState) -> Response {
    let permit = match &state.connection_limit {
        Some(limit) => match Arc::clone(limit).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(user_id = ?params.user_id, "Connection rejected: limit reached");
                return error_response(StatusCode::SERVICE_UNAVAILABLE, "Connection limit reached");
            }
        },
        None => None,
    };

    upgrade.on_upgrade(move |socket| async move {
        let _permit = permit;
        handle_socket(socket, params, state).await;
    })
}

async fn handle_socket(mut socket: WebSocket, params: ConnectParams, state: AppState) {
    let (ctx, rx) = match state.manager.connect(params).await {
        Ok(accepted) => accepted,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting connection");
            let close = Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY,
                reason: "Missing userId".into(),
            }));
            if let Err(e) = socket.send(close).await {
                tracing::debug!(error = %e, "Failed to send close frame");
            }
            return;
        }
    };

    state.stats.connection_opened();

    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_frames(sink, rx, ctx.connection_id));

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    state
                        .manager
                        .handle(&ctx, ConnectionEvent::Text(text.as_str().to_owned()))
                        .await;
                }
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => {
                        state
                            .manager
                            .handle(&ctx, ConnectionEvent::Text(text.to_owned()))
                            .await;
                    }
                    Err(_) => {
                        tracing::warn!(user_id = %ctx.user_id, len = data.len(), "Dropping non-UTF-8 binary frame");
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong answered by axum
                Some(Err(e)) => {
                    tracing::debug!(user_id = %ctx.user_id, error = %e, "WebSocket read error");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    state.manager.handle(&ctx, ConnectionEvent::Disconnected).await;
    writer.abort();
    state.stats.connection_closed();

    tracing::debug!(
        connection_id = ctx.connection_id,
        duration_secs = ctx.duration().as_secs(),
        "Connection closed"
    );
}

/// Forward queued frames to the socket until the queue closes or a close
/// frame has been sent
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<OutboundFrame>,
    connection_id: u64,
) {
    while let Some(frame) = rx.recv().await {
        let (message, closing) = match frame {
            OutboundFrame::Text(text) => (Message::Text(text.as_ref().into()), false),
            OutboundFrame::Close { code, reason } => (
                Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })),
                true,
            ),
        };

        if let Err(e) = sink.send(message).await {
            tracing::debug!(connection_id, error = %e, "WebSocket write failed");
            break;
        }
        if closing {
            break;
        }
    }
}
