//! Member channel handles
//!
//! A handle is the registry's end of one connection's outbound queue. The
//! connection's writer task owns the receiving end.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::error::DeliveryFailure;
use super::frame::OutboundFrame;

/// Handle to a member's live outbound transport
///
/// Cloning yields another handle to the same queue. Delivery never waits: a
/// full or closed queue is reported as a [`DeliveryFailure`].
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    connection_id: u64,
    tx: mpsc::Sender<OutboundFrame>,
    dropped: Arc<AtomicU64>,
}

impl ChannelHandle {
    /// Create a handle and the receiver for the connection's writer
    pub fn new(connection_id: u64, capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            connection_id,
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (handle, rx)
    }

    /// Id of the connection this handle writes to
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Whether the writer is still accepting frames
    pub fn is_writable(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a frame without waiting
    pub fn deliver(&self, frame: OutboundFrame) -> Result<(), DeliveryFailure> {
        self.tx.try_send(frame).map_err(|e| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => DeliveryFailure::Full,
                mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
            }
        })
    }

    /// Ask the writer to close the connection
    ///
    /// Best-effort: if the queue is full the handle is simply dropped, which
    /// also ends the writer once it drains.
    pub fn close(&self, code: u16, reason: &'static str) {
        let _ = self.tx.try_send(OutboundFrame::close(code, reason));
    }

    /// Frames that could not be queued on this connection
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
