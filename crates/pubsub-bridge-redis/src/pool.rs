//! Idle connection pool for publishing.
//!
//! Connections are borrowed with [`RedisPool::get`] and handed back with
//! [`RedisPool::put`] after a successful command. Borrowing prefers the most
//! recently returned connection, discards ones idle past `idle_timeout`, and
//! checks the rest with PING before use.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pubsub_bridge_core::BusError;
use redis::aio::MultiplexedConnection;
use tracing::debug;

/// Pool tuning.
#[derive(Debug, Clone)]
pub struct RedisPoolConfig {
    /// Maximum idle connections kept for reuse.
    pub max_idle: usize,
    /// Idle connections older than this are dropped instead of reused.
    pub idle_timeout: Duration,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 3,
            idle_timeout: Duration::from_secs(240),
        }
    }
}

struct IdleConnection {
    conn: MultiplexedConnection,
    since: Instant,
}

pub struct RedisPool {
    client: redis::Client,
    config: RedisPoolConfig,
    idle: Mutex<VecDeque<IdleConnection>>,
}

impl RedisPool {
    pub fn new(client: redis::Client, config: RedisPoolConfig) -> Self {
        Self {
            client,
            config,
            idle: Mutex::new(VecDeque::new()),
        }
    }

    /// Borrow a healthy connection, dialing a new one if none is idle.
    pub async fn get(&self) -> Result<MultiplexedConnection, BusError> {
        while let Some(idle) = self.pop_idle() {
            if idle.since.elapsed() > self.config.idle_timeout {
                debug!("Dropping idle Redis connection past idle timeout");
                continue;
            }
            let mut conn = idle.conn;
            let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
            match pong {
                Ok(_) => return Ok(conn),
                Err(e) => debug!(error = %e, "Idle Redis connection failed PING, dropping it"),
            }
        }

        debug!("Opening new Redis connection");
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Connect(e.to_string()))
    }

    /// Return a connection after a successful command.
    pub fn put(&self, conn: MultiplexedConnection) {
        let mut idle = self.idle.lock();
        if idle.len() >= self.config.max_idle {
            return;
        }
        idle.push_front(IdleConnection {
            conn,
            since: Instant::now(),
        });
    }

    /// Connections currently waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn pop_idle(&self) -> Option<IdleConnection> {
        self.idle.lock().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_pool() -> RedisPool {
        // Port 1 is reserved; nothing answers there.
        let client = redis::Client::open("redis://127.0.0.1:1").unwrap();
        RedisPool::new(client, RedisPoolConfig::default())
    }

    #[test]
    fn test_default_config() {
        let config = RedisPoolConfig::default();
        assert_eq!(config.max_idle, 3);
        assert_eq!(config.idle_timeout, Duration::from_secs(240));
    }

    #[test]
    fn test_new_pool_is_empty() {
        assert_eq!(unreachable_pool().idle_count(), 0);
    }

    #[tokio::test]
    async fn test_get_reports_connect_error() {
        let pool = unreachable_pool();
        let result = pool.get().await;
        assert!(matches!(result, Err(BusError::Connect(_))));
        assert_eq!(pool.idle_count(), 0);
    }
}
