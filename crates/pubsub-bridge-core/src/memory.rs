//! In-process bus.
//!
//! Implements both bus traits on top of `tokio::sync::broadcast`, so a single
//! process can run the bridge without an external broker. The test suites
//! use it to simulate dropped connections and failed subscribes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::bus::{BusEvent, BusPublisher, BusSubscriber, Subscription};
use crate::error::BusError;

const DEFAULT_CAPACITY: usize = 1024;

/// A bus that lives entirely in memory.
pub struct MemoryBus {
    channels: Mutex<HashMap<String, broadcast::Sender<Bytes>>>,
    capacity: usize,
    failing_subscribes: AtomicU32,
    subscribe_calls: AtomicU32,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus whose per-channel buffer holds `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            failing_subscribes: AtomicU32::new(0),
            subscribe_calls: AtomicU32::new(0),
        }
    }

    /// Drop every subscription on `channel`, as if the broker went away.
    pub fn disconnect(&self, channel: &str) {
        if self.channels.lock().remove(channel).is_some() {
            debug!(channel, "memory bus channel disconnected");
        }
    }

    /// Make the next `count` subscribe calls fail.
    pub fn fail_next_subscribes(&self, count: u32) {
        self.failing_subscribes.store(count, Ordering::SeqCst);
    }

    /// Number of subscribe calls seen so far, failed ones included.
    pub fn subscribe_calls(&self) -> u32 {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Bytes> {
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusSubscriber for MemoryBus {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BusError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failing_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BusError::Subscribe {
                channel: channel.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let receiver = self.sender(channel).subscribe();
        Ok(Box::new(MemorySubscription {
            channel: channel.to_string(),
            receiver,
            confirmed: false,
        }))
    }
}

#[async_trait]
impl BusPublisher for MemoryBus {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BusError> {
        // No subscribers is not an error, same as PUBLISH on a real broker.
        let _ = self.sender(channel).send(payload);
        Ok(())
    }
}

struct MemorySubscription {
    channel: String,
    receiver: broadcast::Receiver<Bytes>,
    confirmed: bool,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_event(&mut self) -> Option<BusEvent> {
        if !self.confirmed {
            self.confirmed = true;
            return Some(BusEvent::Subscribed {
                channel: self.channel.clone(),
                kind: "subscribe".to_string(),
                count: 1,
            });
        }

        match self.receiver.recv().await {
            Ok(payload) => Some(BusEvent::Message {
                channel: self.channel.clone(),
                payload,
            }),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                Some(BusEvent::Error(BusError::Subscribe {
                    channel: self.channel.clone(),
                    reason: format!("subscriber lagged, {skipped} messages lost"),
                }))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
