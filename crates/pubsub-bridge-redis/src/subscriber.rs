//! Redis subscriptions.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use pubsub_bridge_core::{BusError, BusEvent, BusSubscriber, Subscription};
use tracing::debug;

/// Opens one dedicated pub/sub connection per subscription.
pub struct RedisSubscriber {
    client: redis::Client,
}

impl RedisSubscriber {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BusSubscriber for RedisSubscriber {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;

        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BusError::Subscribe {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;
        debug!(channel, "Redis SUBSCRIBE acknowledged");

        Ok(Box::new(RedisSubscription {
            channel: channel.to_string(),
            messages: pubsub.into_on_message().boxed(),
            confirmed: false,
        }))
    }
}

struct RedisSubscription {
    channel: String,
    messages: BoxStream<'static, redis::Msg>,
    confirmed: bool,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next_event(&mut self) -> Option<BusEvent> {
        // The client consumes the SUBSCRIBE reply itself, so report it here.
        if !self.confirmed {
            self.confirmed = true;
            return Some(BusEvent::Subscribed {
                channel: self.channel.clone(),
                kind: "subscribe".to_string(),
                count: 1,
            });
        }

        let msg = self.messages.next().await?;
        Some(BusEvent::Message {
            channel: msg.get_channel_name().to_string(),
            payload: Bytes::copy_from_slice(msg.get_payload_bytes()),
        })
    }
}
