//! Write side of a registered client connection.

use bytes::Bytes;

use crate::error::DeliveryError;

/// The handle the registry keeps for each live connection.
///
/// Implementations must not block: `try_deliver` hands a complete frame to
/// the connection's own writer (or fails straight away), which keeps every
/// frame intact on the wire and keeps I/O out of the registry lock.
///
/// `try_deliver` runs while the registry holds its lock, so it must never
/// call back into the registry.
pub trait ClientSink: Send + Sync {
    /// Queue one message for delivery to the client.
    fn try_deliver(&self, payload: &Bytes) -> Result<(), DeliveryError>;

    /// Close the connection. Called once, when the registry drops it.
    fn close(&self);
}
