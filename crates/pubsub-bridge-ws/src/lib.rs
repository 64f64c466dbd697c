//! # pubsub-bridge WebSocket endpoint
//!
//! Serves `GET /ws` and `GET /health`. Every accepted WebSocket becomes a
//! [`ConnectionSession`]: registered with the connection registry for
//! fan-out, its text frames handed to the publish bridge.
//!
//! ## Usage
//!
//! ```ignore
//! let state = Arc::new(BridgeState::new(registry, publisher, origins, session, shutdown, subscription));
//! let listener = pubsub_bridge_ws::bind("0.0.0.0:8080").await?;
//! pubsub_bridge_ws::serve(listener, state).await?;
//! ```

mod error;
mod origin;
mod server;
mod session;
mod sink;
mod writer;

pub use error::ServerError;
pub use origin::OriginPolicy;
pub use server::{bind, create_router, serve, BridgeState};
pub use session::{CloseReason, ConnectionSession, SessionConfig, SessionOutcome, SessionState};
pub use sink::WsClientSink;
