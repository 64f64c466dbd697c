//! # pubsub-bridge Redis backend
//!
//! Implements the bus traits from `pubsub-bridge-core` on top of Redis
//! pub/sub. Subscriptions each get a dedicated connection; publishes borrow
//! from a small idle pool.

mod address;
mod pool;
mod publisher;
mod subscriber;

pub use address::{BusAddress, BusBackend};
pub use pool::{RedisPool, RedisPoolConfig};
pub use publisher::RedisPublisher;
pub use subscriber::RedisSubscriber;

use pubsub_bridge_core::BusError;

/// Open a Redis client for a parsed `redis://` or `rediss://` address.
pub fn open_client(address: &BusAddress) -> Result<redis::Client, BusError> {
    if address.backend() != BusBackend::Redis {
        return Err(BusError::InvalidAddress(format!(
            "'{address}' is not a Redis address"
        )));
    }
    if address.is_tls() && !cfg!(feature = "tls") {
        return Err(BusError::InvalidAddress(format!(
            "'{address}' needs TLS, build with the `tls` feature"
        )));
    }
    redis::Client::open(address.as_str()).map_err(|e| BusError::InvalidAddress(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_client_for_redis_address() {
        let address = BusAddress::parse("redis://:secret@localhost:6379/0").unwrap();
        let client = open_client(&address).unwrap();
        assert_eq!(client.get_connection_info().redis.db, 0);
    }

    #[test]
    fn test_open_client_rejects_memory_address() {
        let address = BusAddress::parse("memory://").unwrap();
        assert!(matches!(
            open_client(&address),
            Err(BusError::InvalidAddress(_))
        ));
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    fn test_tls_address_needs_feature() {
        let address = BusAddress::parse("rediss://cache.example.com:6380").unwrap();
        let err = open_client(&address).unwrap_err();
        assert!(err.to_string().contains("tls"));
    }
}
