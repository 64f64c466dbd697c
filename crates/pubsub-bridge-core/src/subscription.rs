//! Bus subscription → registry fan-out.
//!
//! The bridge keeps exactly one subscription to the configured channel. When
//! the subscription breaks (connection lost, error event, failed subscribe)
//! it waits an exponentially growing, jittered delay and subscribes again,
//! until it succeeds or the shutdown token fires.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::{Backoff, BackoffConfig};
use crate::bus::{BusEvent, BusSubscriber, Subscription};
use crate::error::BridgeError;
use crate::registry::ConnectionRegistry;

/// Health of the subscription, as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Opening a subscription.
    Connecting,
    /// Subscribed and forwarding messages.
    Subscribed,
    /// The last subscription broke; waiting to retry.
    Degraded,
    /// The bridge has stopped.
    Stopped,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionState::Connecting => write!(f, "connecting"),
            SubscriptionState::Subscribed => write!(f, "subscribed"),
            SubscriptionState::Degraded => write!(f, "degraded"),
            SubscriptionState::Stopped => write!(f, "stopped"),
        }
    }
}

enum PumpExit {
    Cancelled,
    Lost(String),
}

/// Forwards every message on one bus channel to all registered connections.
pub struct SubscriptionBridge {
    subscriber: Arc<dyn BusSubscriber>,
    channel: String,
    registry: Arc<ConnectionRegistry>,
    backoff: BackoffConfig,
    cancel: CancellationToken,
    state: watch::Sender<SubscriptionState>,
}

impl SubscriptionBridge {
    pub fn new(
        subscriber: Arc<dyn BusSubscriber>,
        channel: impl Into<String>,
        registry: Arc<ConnectionRegistry>,
        backoff: BackoffConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Connecting);
        Self {
            subscriber,
            channel: channel.into(),
            registry,
            backoff,
            cancel,
            state,
        }
    }

    /// Watch the subscription state.
    pub fn state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    /// Run until cancelled, resubscribing whenever the subscription breaks.
    ///
    /// Only returns an error when `max_attempts` is configured and exhausted.
    pub async fn run(self) -> Result<(), BridgeError> {
        let mut backoff = Backoff::new(self.backoff.clone());

        loop {
            self.set_state(SubscriptionState::Connecting);
            let subscribed = tokio::select! {
                () = self.cancel.cancelled() => break,
                result = self.subscriber.subscribe(&self.channel) => result,
            };

            match subscribed {
                Ok(mut subscription) => {
                    backoff.reset();
                    self.set_state(SubscriptionState::Subscribed);
                    info!(channel = %self.channel, "Subscribed to bus channel");

                    match self.pump(subscription.as_mut()).await {
                        PumpExit::Cancelled => break,
                        PumpExit::Lost(reason) => {
                            warn!(channel = %self.channel, reason = %reason, "Bus subscription lost");
                        }
                    }
                }
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "Unable to subscribe to bus channel");
                }
            }
            self.set_state(SubscriptionState::Degraded);

            let Some(delay) = backoff.next_delay() else {
                let attempts = backoff.attempt();
                error!(
                    channel = %self.channel,
                    attempts,
                    "Giving up on bus subscription, fan-out has stopped"
                );
                self.set_state(SubscriptionState::Stopped);
                return Err(BridgeError::ReconnectExhausted {
                    channel: self.channel.clone(),
                    attempts,
                });
            };

            info!(
                channel = %self.channel,
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Resubscribing after delay"
            );
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(SubscriptionState::Stopped);
        info!(channel = %self.channel, "Subscription bridge stopped");
        Ok(())
    }

    async fn pump(&self, subscription: &mut dyn Subscription) -> PumpExit {
        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => return PumpExit::Cancelled,
                event = subscription.next_event() => event,
            };

            match event {
                Some(BusEvent::Message { channel, payload }) => {
                    let report = self.registry.broadcast(&payload);
                    debug!(
                        channel = %channel,
                        size = payload.len(),
                        delivered = report.delivered,
                        evicted = report.evicted.len(),
                        "Bus message broadcast"
                    );
                }
                Some(BusEvent::Subscribed {
                    channel,
                    kind,
                    count,
                }) => {
                    info!(channel = %channel, kind = %kind, count, "Bus subscription confirmed");
                }
                Some(BusEvent::Error(e)) => {
                    error!(channel = %self.channel, error = %e, "Error while subscribed to bus channel");
                    return PumpExit::Lost(e.to_string());
                }
                None => return PumpExit::Lost("connection closed".to_string()),
            }
        }
    }

    fn set_state(&self, state: SubscriptionState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
