//! Registry-facing handle of a WebSocket connection.

use bytes::Bytes;
use pubsub_bridge_core::{ClientSink, DeliveryError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Queues frames for a connection's writer task.
///
/// Delivery never blocks: a full queue means the client is not keeping up
/// and is reported as [`DeliveryError::Full`] so the registry evicts it.
pub struct WsClientSink {
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
}

impl WsClientSink {
    /// Create a sink and the receiving end its writer drains.
    pub fn channel(capacity: usize, cancel: CancellationToken) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, cancel }, rx)
    }
}

impl ClientSink for WsClientSink {
    fn try_deliver(&self, payload: &Bytes) -> Result<(), DeliveryError> {
        if self.cancel.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(payload.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}
