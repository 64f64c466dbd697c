//! Per-connection writer task.

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes};
use bytes::Bytes;
use futures::{Sink, SinkExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub(crate) struct Writer<Si> {
    pub(crate) id: String,
    pub(crate) sink: Si,
    pub(crate) outbound: mpsc::Receiver<Bytes>,
    pub(crate) close: oneshot::Receiver<CloseFrame>,
    pub(crate) cancel: CancellationToken,
    pub(crate) write_timeout: Duration,
    pub(crate) ping_interval: Duration,
}

impl<Si> Writer<Si>
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    /// Write queued frames and pings until the session ends, then finish
    /// with a Close frame.
    ///
    /// A failed or timed out write cancels the session token and skips the
    /// closing handshake.
    pub(crate) async fn run(mut self) {
        let mut ping = interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let frame = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = self.outbound.recv() => match next {
                    Some(payload) => frame_for(payload),
                    None => {
                        self.cancel.cancel();
                        break;
                    }
                },
                _ = ping.tick() => {
                    trace!(connection_id = %self.id, "Sending ping");
                    Message::Ping(Bytes::new())
                }
            };

            if let Err(e) = self.send(frame).await {
                warn!(connection_id = %self.id, error = %e, "Error writing to connection, closing it");
                self.cancel.cancel();
                return;
            }
        }

        let frame = (&mut self.close).await.ok();
        if let Some(ref frame) = frame {
            debug!(connection_id = %self.id, code = frame.code, "Sending close frame");
        }
        let _ = self.send(Message::Close(frame)).await;
        let _ = timeout(self.write_timeout, self.sink.close()).await;
    }

    async fn send(&mut self, frame: Message) -> Result<(), String> {
        match timeout(self.write_timeout, self.sink.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("write timed out after {:?}", self.write_timeout)),
        }
    }
}

/// Bus payloads go out as text when they are UTF-8, binary otherwise.
fn frame_for(payload: Bytes) -> Message {
    match Utf8Bytes::try_from(payload.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(payload),
    }
}
