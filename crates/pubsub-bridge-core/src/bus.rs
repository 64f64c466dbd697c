//! Message bus seams.
//!
//! A bus backend provides two independent capabilities: subscribing to a
//! channel and publishing to it. The bridges only ever talk to a bus through
//! these traits.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::BusError;

/// An event received while subscribed to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// A data message published on the channel.
    Message { channel: String, payload: Bytes },
    /// The bus confirmed a subscription change.
    Subscribed {
        channel: String,
        kind: String,
        count: usize,
    },
    /// The subscription hit an error and should be considered broken.
    Error(BusError),
}

/// An active subscription.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next event.
    ///
    /// Returns `None` once the underlying connection is gone; no further
    /// events will arrive on this subscription after that.
    async fn next_event(&mut self) -> Option<BusEvent>;
}

/// Opens subscriptions on the bus.
#[async_trait]
pub trait BusSubscriber: Send + Sync {
    /// Establish a fresh connection and subscribe to `channel`.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BusError>;
}

/// Publishes messages onto the bus.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Publish `payload` on `channel` and flush it to the bus.
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BusError>;
}
