//! # pubsub-bridge core
//!
//! The concurrent engine shared by every transport and bus backend:
//!
//! - [`ConnectionRegistry`] owns the live client connections and fans bus
//!   messages out to them.
//! - [`SubscriptionBridge`] keeps one subscription to the configured bus
//!   channel alive and feeds every message into the registry.
//! - [`PublishBridge`] funnels client messages from many sessions onto a
//!   single bus publishing path.
//!
//! Buses and client transports plug in through the [`BusSubscriber`],
//! [`BusPublisher`] and [`ClientSink`] traits, so the engine can be driven by
//! Redis in production and by [`MemoryBus`] in tests or local runs.

pub mod backoff;
pub mod bus;
pub mod error;
pub mod memory;
pub mod publish;
pub mod registry;
pub mod sink;
pub mod subscription;

pub use backoff::{Backoff, BackoffConfig};
pub use bus::{BusEvent, BusPublisher, BusSubscriber, Subscription};
pub use error::{BridgeError, BusError, DeliveryError, PublishError};
pub use memory::MemoryBus;
pub use publish::{OverflowPolicy, PublishBridge, PublishBridgeConfig, PublishWorker};
pub use registry::{BroadcastReport, ConnectionId, ConnectionRegistry};
pub use sink::ClientSink;
pub use subscription::{SubscriptionBridge, SubscriptionState};
