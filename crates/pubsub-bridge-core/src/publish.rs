//! Client messages → bus.
//!
//! Many sessions produce messages concurrently but the bus connection must
//! only be driven by one task. [`PublishBridge`] handles are cheap clones of
//! the producer end of a bounded queue; the single [`PublishWorker`] drains
//! it in order. On shutdown the worker stops accepting new messages and
//! publishes whatever is already queued before exiting.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::{Backoff, BackoffConfig};
use crate::bus::BusPublisher;
use crate::error::PublishError;

/// What `publish` does when the queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Wait for room; the slow bus pushes back on the producing client.
    #[default]
    Block,
    /// Fail immediately with [`PublishError::QueueFull`].
    Reject,
}

/// Publish path tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishBridgeConfig {
    /// Messages that may wait for the worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Retries of a failed publish before the message is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay schedule between retries.
    #[serde(default = "default_retry_backoff")]
    pub retry: BackoffConfig,
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay_ms: 50,
        max_delay_ms: 1_000,
        ..BackoffConfig::default()
    }
}

impl Default for PublishBridgeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
            max_retries: default_max_retries(),
            retry: default_retry_backoff(),
        }
    }
}

/// Producer handle shared by every session.
#[derive(Clone)]
pub struct PublishBridge {
    tx: mpsc::Sender<Bytes>,
    overflow: OverflowPolicy,
}

impl PublishBridge {
    /// Create the producer handle and the worker that owns the bus path.
    pub fn new(
        publisher: Arc<dyn BusPublisher>,
        channel: impl Into<String>,
        config: PublishBridgeConfig,
        cancel: CancellationToken,
    ) -> (Self, PublishWorker) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let bridge = Self {
            tx,
            overflow: config.overflow,
        };
        let worker = PublishWorker {
            rx,
            publisher,
            channel: channel.into(),
            config,
            cancel,
        };
        (bridge, worker)
    }

    /// Queue `payload` for publishing.
    ///
    /// Returns once the message is queued, not when the bus has it.
    pub async fn publish(&self, payload: Bytes) -> Result<(), PublishError> {
        match self.overflow {
            OverflowPolicy::Block => self
                .tx
                .send(payload)
                .await
                .map_err(|_| PublishError::Closed),
            OverflowPolicy::Reject => self.tx.try_send(payload).map_err(|e| match e {
                mpsc::error::TrySendError::Full(payload) => PublishError::QueueFull {
                    size: payload.len(),
                },
                mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
            }),
        }
    }

    /// Free slots in the queue.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The single consumer of the publish queue.
pub struct PublishWorker {
    rx: mpsc::Receiver<Bytes>,
    publisher: Arc<dyn BusPublisher>,
    channel: String,
    config: PublishBridgeConfig,
    cancel: CancellationToken,
}

impl PublishWorker {
    /// Publish queued messages until cancelled, then drain the queue.
    pub async fn run(mut self) {
        info!(channel = %self.channel, "Publish worker started");
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = self.rx.recv() => next,
            };
            match next {
                Some(payload) => self.publish_with_retry(payload).await,
                None => {
                    info!(channel = %self.channel, "All publishers gone, publish worker stopped");
                    return;
                }
            }
        }

        self.rx.close();
        let mut drained = 0usize;
        while let Some(payload) = self.rx.recv().await {
            self.publish_once(&payload).await;
            drained += 1;
        }
        info!(channel = %self.channel, drained, "Publish worker stopped");
    }

    async fn publish_with_retry(&self, payload: Bytes) {
        let mut backoff = Backoff::new(self.config.retry.clone());
        let mut retries = 0u32;
        loop {
            match self.publisher.publish(&self.channel, payload.clone()).await {
                Ok(()) => {
                    debug!(channel = %self.channel, size = payload.len(), "Message published");
                    return;
                }
                Err(e) if retries < self.config.max_retries => {
                    retries += 1;
                    let delay = backoff.next_delay().unwrap_or_default();
                    warn!(
                        channel = %self.channel,
                        size = payload.len(),
                        error = %e,
                        retry = retries,
                        "Unable to publish message, retrying"
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            self.publish_once(&payload).await;
                            return;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    error!(
                        channel = %self.channel,
                        size = payload.len(),
                        error = %e,
                        retries,
                        "Unable to publish message, dropping it"
                    );
                    return;
                }
            }
        }
    }

    async fn publish_once(&self, payload: &Bytes) {
        if let Err(e) = self.publisher.publish(&self.channel, payload.clone()).await {
            error!(
                channel = %self.channel,
                size = payload.len(),
                error = %e,
                "Unable to publish message during shutdown, dropping it"
            );
        }
    }
}

#[cfg(test)]
#[path = "publish_tests.rs"]
mod tests;
