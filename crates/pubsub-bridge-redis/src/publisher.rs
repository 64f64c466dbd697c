//! Redis publishing.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use pubsub_bridge_core::{BusError, BusPublisher};
use redis::AsyncCommands;
use tracing::debug;

use crate::pool::RedisPool;

/// Publishes over pooled connections.
///
/// A connection goes back to the pool only after a successful PUBLISH; one
/// that failed is dropped so the next publish dials a fresh connection.
pub struct RedisPublisher {
    pool: Arc<RedisPool>,
}

impl RedisPublisher {
    pub fn new(pool: Arc<RedisPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BusPublisher for RedisPublisher {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BusError> {
        let mut conn = self.pool.get().await?;

        let result: redis::RedisResult<i64> = conn.publish(channel, &payload[..]).await;
        match result {
            Ok(receivers) => {
                debug!(channel, size = payload.len(), receivers, "Published to Redis");
                self.pool.put(conn);
                Ok(())
            }
            Err(e) => Err(BusError::Publish {
                channel: channel.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
