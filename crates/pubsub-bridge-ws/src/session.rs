//! One client connection, from registration to close.
//!
//! A session registers the client for fan-out, spawns its writer task, and
//! then reads frames until the client leaves, misbehaves, goes silent, or
//! the bridge shuts down. Deregistration happens exactly once, on the way
//! out, before the closing handshake is attempted.

use std::fmt;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message};
use bytes::Bytes;
use futures::{Sink, Stream, StreamExt};
use pubsub_bridge_core::{ConnectionId, ConnectionRegistry, PublishBridge, PublishError};
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::sink::WsClientSink;
use crate::writer::Writer;

/// Per-connection tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Evict a client that sends no frame for this long.
    pub read_timeout: Duration,
    /// Give up on a single frame write after this long.
    pub write_timeout: Duration,
    pub ping_interval: Duration,
    /// Frames queued for a slow client before it is evicted.
    pub outbound_buffer: usize,
    /// Consecutive rejected publishes before the session is closed.
    /// 0 never closes.
    pub max_publish_failures: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
            outbound_buffer: 64,
            max_publish_failures: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Registered,
    Reading,
    /// Dropping a frame the bridge does not forward.
    Discard,
    Closing,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a Close frame.
    ClientClosed,
    /// The stream ended without a Close frame.
    StreamEnded,
    ReadError(String),
    /// Nothing received within the read timeout.
    ReadTimeout,
    /// Removed by the registry after a failed delivery.
    Evicted,
    /// The writer task could not write to the socket.
    WriteFailed,
    /// Too many consecutive publishes were rejected.
    PublishRejected,
    Shutdown,
}

impl CloseReason {
    /// Whether the connection ended without a fault on either side.
    pub fn is_orderly(&self) -> bool {
        matches!(
            self,
            CloseReason::ClientClosed | CloseReason::StreamEnded | CloseReason::Shutdown
        )
    }

    fn close_frame(&self) -> CloseFrame {
        let (code, reason) = match self {
            CloseReason::ClientClosed | CloseReason::StreamEnded => (close_code::NORMAL, ""),
            CloseReason::ReadError(_) => (close_code::PROTOCOL, "read error"),
            CloseReason::ReadTimeout => (close_code::POLICY, "idle timeout"),
            CloseReason::Evicted | CloseReason::WriteFailed => (close_code::POLICY, "too slow"),
            CloseReason::PublishRejected => (close_code::AGAIN, "publish queue full"),
            CloseReason::Shutdown => (close_code::AWAY, "server shutting down"),
        };
        CloseFrame {
            code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ClientClosed => write!(f, "client closed"),
            CloseReason::StreamEnded => write!(f, "stream ended"),
            CloseReason::ReadError(e) => write!(f, "read error: {e}"),
            CloseReason::ReadTimeout => write!(f, "read timeout"),
            CloseReason::Evicted => write!(f, "evicted"),
            CloseReason::WriteFailed => write!(f, "write failed"),
            CloseReason::PublishRejected => write!(f, "publish rejected"),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub id: ConnectionId,
    pub reason: CloseReason,
    /// Text frames handed to the publish bridge.
    pub published: u64,
    /// Frames dropped without publishing.
    pub discarded: u64,
}

pub struct ConnectionSession {
    registry: Arc<ConnectionRegistry>,
    publisher: PublishBridge,
    config: SessionConfig,
    shutdown: CancellationToken,
    state: watch::Sender<SessionState>,
}

#[derive(Default)]
struct Counters {
    published: u64,
    discarded: u64,
    rejected_in_a_row: u32,
}

impl ConnectionSession {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        publisher: PublishBridge,
        config: SessionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            registry,
            publisher,
            config,
            shutdown,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Drive the connection until it ends.
    ///
    /// `stream` and `sink` are the two halves of an accepted WebSocket.
    pub async fn run<St, Si, E>(self, mut stream: St, sink: Si) -> SessionOutcome
    where
        St: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
        Si: Sink<Message> + Unpin + Send + 'static,
        Si::Error: Display + Send,
    {
        let cancel = self.shutdown.child_token();
        let (client, outbound) = WsClientSink::channel(self.config.outbound_buffer, cancel.clone());
        let id = self.registry.register(Box::new(client));
        self.set_state(SessionState::Registered);
        info!(connection_id = %id, connections = self.registry.len(), "Client connected");

        let (close_tx, close_rx) = oneshot::channel();
        let writer = tokio::spawn(
            Writer {
                id: id.clone(),
                sink,
                outbound,
                close: close_rx,
                cancel: cancel.clone(),
                write_timeout: self.config.write_timeout,
                ping_interval: self.config.ping_interval,
            }
            .run(),
        );

        let mut counters = Counters::default();
        let reason = self.read_loop(&id, &mut stream, &cancel, &mut counters).await;

        self.set_state(SessionState::Closing);
        self.registry.deregister(&id);
        cancel.cancel();
        let _ = close_tx.send(reason.close_frame());
        if let Err(e) = writer.await {
            warn!(connection_id = %id, error = %e, "Writer task failed");
        }

        if reason.is_orderly() {
            info!(connection_id = %id, reason = %reason, published = counters.published, "Client disconnected");
        } else {
            warn!(connection_id = %id, reason = %reason, published = counters.published, "Client connection closed abnormally");
        }
        self.set_state(SessionState::Closed);

        SessionOutcome {
            id,
            reason,
            published: counters.published,
            discarded: counters.discarded,
        }
    }

    async fn read_loop<St, E>(
        &self,
        id: &str,
        stream: &mut St,
        cancel: &CancellationToken,
        counters: &mut Counters,
    ) -> CloseReason
    where
        St: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        self.set_state(SessionState::Reading);
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return self.cancelled_reason(id),
                next = timeout(self.config.read_timeout, stream.next()) => next,
            };

            let message = match next {
                Err(_) => return CloseReason::ReadTimeout,
                Ok(None) => return CloseReason::StreamEnded,
                Ok(Some(Err(e))) => return CloseReason::ReadError(e.to_string()),
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => {
                    let payload = Bytes::from(text);
                    if let Some(reason) = self.publish(id, payload, cancel, counters).await {
                        return reason;
                    }
                }
                Message::Binary(data) => {
                    self.set_state(SessionState::Discard);
                    counters.discarded += 1;
                    warn!(connection_id = %id, size = data.len(), "Unexpected binary frame, discarding it");
                    self.set_state(SessionState::Reading);
                }
                Message::Ping(_) | Message::Pong(_) => {
                    trace!(connection_id = %id, "Liveness frame");
                }
                Message::Close(frame) => {
                    if let Some(frame) = frame {
                        debug!(connection_id = %id, code = frame.code, reason = frame.reason.as_str(), "Close frame received");
                    }
                    return CloseReason::ClientClosed;
                }
            }
        }
    }

    /// Hand one text payload to the publish bridge. Returns a reason when the
    /// session has to end.
    async fn publish(
        &self,
        id: &str,
        payload: Bytes,
        cancel: &CancellationToken,
        counters: &mut Counters,
    ) -> Option<CloseReason> {
        let size = payload.len();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Some(self.cancelled_reason(id)),
            result = self.publisher.publish(payload) => result,
        };

        match result {
            Ok(()) => {
                counters.published += 1;
                counters.rejected_in_a_row = 0;
                None
            }
            Err(PublishError::Closed) => Some(CloseReason::Shutdown),
            Err(e) => {
                counters.discarded += 1;
                counters.rejected_in_a_row += 1;
                warn!(connection_id = %id, size, error = %e, "Dropping client message");
                let limit = self.config.max_publish_failures;
                (limit > 0 && counters.rejected_in_a_row >= limit).then_some(CloseReason::PublishRejected)
            }
        }
    }

    fn cancelled_reason(&self, id: &str) -> CloseReason {
        if self.shutdown.is_cancelled() {
            CloseReason::Shutdown
        } else if self.registry.contains(id) {
            CloseReason::WriteFailed
        } else {
            CloseReason::Evicted
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
