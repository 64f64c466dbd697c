//! Error types for the bridge engine.

use thiserror::Error;

/// Errors raised by a bus backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// Could not establish a connection to the bus.
    #[error("Bus connection failed: {0}")]
    Connect(String),

    /// Subscribing to a channel failed.
    #[error("Subscribe to '{channel}' failed: {reason}")]
    Subscribe { channel: String, reason: String },

    /// Publishing (or flushing) a message failed.
    #[error("Publish to '{channel}' failed: {reason}")]
    Publish { channel: String, reason: String },

    /// The bus connection went away.
    #[error("Bus connection closed")]
    Closed,

    /// The bus address could not be understood.
    #[error("Invalid bus address: {0}")]
    InvalidAddress(String),
}

/// Errors returned to producers by [`crate::PublishBridge::publish`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    /// The publish queue is full and the overflow policy rejects new messages.
    #[error("Publish queue full, dropped {size} byte message")]
    QueueFull { size: usize },

    /// The publish worker has shut down.
    #[error("Publish queue closed")]
    Closed,
}

/// Errors returned by a [`crate::ClientSink`] when a frame cannot be queued.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection's writer has gone away.
    #[error("connection closed")]
    Closed,

    /// The connection's outbound buffer is full; the client is not keeping up.
    #[error("outbound buffer full")]
    Full,
}

/// Terminal errors of the long-running bridge tasks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The subscription could not be re-established within the attempt limit.
    #[error("Gave up resubscribing to '{channel}' after {attempts} attempts")]
    ReconnectExhausted { channel: String, attempts: u32 },
}
