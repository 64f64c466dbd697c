use super::*;

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

use crate::bus::BusPublisher;
use crate::error::{BusError, DeliveryError};
use crate::memory::MemoryBus;
use crate::sink::ClientSink;

const WAIT: Duration = Duration::from_secs(5);

struct ChannelSink(mpsc::UnboundedSender<Bytes>);

impl ClientSink for ChannelSink {
    fn try_deliver(&self, payload: &Bytes) -> Result<(), DeliveryError> {
        self.0.send(payload.clone()).map_err(|_| DeliveryError::Closed)
    }

    fn close(&self) {}
}

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay_ms: 10,
        max_delay_ms: 50,
        multiplier: 2.0,
        jitter: 0.0,
        max_attempts: 0,
    }
}

fn registry_with_client() -> (Arc<ConnectionRegistry>, mpsc::UnboundedReceiver<Bytes>) {
    let registry = Arc::new(ConnectionRegistry::new());
    let (tx, rx) = mpsc::unbounded_channel();
    registry.register(Box::new(ChannelSink(tx)));
    (registry, rx)
}

async fn wait_for(state: &mut watch::Receiver<SubscriptionState>, target: SubscriptionState) {
    timeout(WAIT, state.wait_for(|s| *s == target))
        .await
        .expect("timed out waiting for subscription state")
        .expect("bridge dropped");
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

/// Subscriber that replays a fixed script of outcomes and records when it
/// was called.
struct ScriptedSubscriber {
    script: Mutex<VecDeque<Result<Vec<BusEvent>, BusError>>>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedSubscriber {
    fn new(script: Vec<Result<Vec<BusEvent>, BusError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

struct ScriptedSubscription {
    events: VecDeque<BusEvent>,
    hold_open: bool,
}

#[async_trait]
impl Subscription for ScriptedSubscription {
    async fn next_event(&mut self) -> Option<BusEvent> {
        match self.events.pop_front() {
            Some(event) => Some(event),
            None if self.hold_open => std::future::pending().await,
            None => None,
        }
    }
}

#[async_trait]
impl BusSubscriber for ScriptedSubscriber {
    async fn subscribe(&self, _channel: &str) -> Result<Box<dyn Subscription>, BusError> {
        self.calls.lock().push(Instant::now());
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(events)) => Ok(Box::new(ScriptedSubscription {
                events: events.into(),
                hold_open: true,
            })),
            Some(Err(e)) => Err(e),
            // Script exhausted: stay subscribed forever.
            None => Ok(Box::new(ScriptedSubscription {
                events: VecDeque::new(),
                hold_open: true,
            })),
        }
    }
}

fn subscribe_failure() -> BusError {
    BusError::Subscribe {
        channel: "chat".to_string(),
        reason: "connection refused".to_string(),
    }
}

#[tokio::test]
async fn test_bus_message_is_broadcast_once() {
    let bus = Arc::new(MemoryBus::new());
    let (registry, mut client) = registry_with_client();
    let cancel = CancellationToken::new();
    let bridge = SubscriptionBridge::new(
        bus.clone(),
        "chat",
        registry.clone(),
        fast_backoff(),
        cancel.clone(),
    );
    let mut state = bridge.state();
    let handle = tokio::spawn(bridge.run());

    wait_for(&mut state, SubscriptionState::Subscribed).await;
    wait_until(|| bus.subscriber_count("chat") == 1).await;
    bus.publish("chat", Bytes::from_static(b"hello")).await.unwrap();

    let received = timeout(WAIT, client.recv()).await.unwrap().unwrap();
    assert_eq!(received, Bytes::from_static(b"hello"));
    assert!(client.try_recv().is_err());

    cancel.cancel();
    assert_eq!(handle.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn test_confirmation_event_is_not_broadcast() {
    let subscriber = Arc::new(ScriptedSubscriber::new(vec![Ok(vec![BusEvent::Subscribed {
        channel: "chat".to_string(),
        kind: "subscribe".to_string(),
        count: 1,
    }])]));
    let (registry, mut client) = registry_with_client();
    let cancel = CancellationToken::new();
    let bridge = SubscriptionBridge::new(
        subscriber,
        "chat",
        registry,
        fast_backoff(),
        cancel.clone(),
    );
    let mut state = bridge.state();
    let handle = tokio::spawn(bridge.run());

    wait_for(&mut state, SubscriptionState::Subscribed).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(client.try_recv().is_err());

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_resubscribes_after_connection_drop() {
    let bus = Arc::new(MemoryBus::new());
    let (registry, mut client) = registry_with_client();
    let cancel = CancellationToken::new();
    let bridge = SubscriptionBridge::new(
        bus.clone(),
        "chat",
        registry,
        fast_backoff(),
        cancel.clone(),
    );
    let handle = tokio::spawn(bridge.run());

    wait_until(|| bus.subscriber_count("chat") == 1).await;
    bus.disconnect("chat");

    wait_until(|| bus.subscribe_calls() >= 2 && bus.subscriber_count("chat") == 1).await;
    bus.publish("chat", Bytes::from_static(b"after")).await.unwrap();

    let received = timeout(WAIT, client.recv()).await.unwrap().unwrap();
    assert_eq!(received, Bytes::from_static(b"after"));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_retry_delays_increase() {
    let subscriber = Arc::new(ScriptedSubscriber::new(vec![
        Err(subscribe_failure()),
        Err(subscribe_failure()),
        Err(subscribe_failure()),
    ]));
    let registry = Arc::new(ConnectionRegistry::new());
    let cancel = CancellationToken::new();
    let backoff = BackoffConfig {
        initial_delay_ms: 100,
        max_delay_ms: 10_000,
        multiplier: 2.0,
        jitter: 0.0,
        max_attempts: 0,
    };
    let bridge = SubscriptionBridge::new(
        subscriber.clone(),
        "chat",
        registry,
        backoff,
        cancel.clone(),
    );
    let mut state = bridge.state();
    let handle = tokio::spawn(bridge.run());

    wait_for(&mut state, SubscriptionState::Subscribed).await;

    let calls = subscriber.calls.lock().clone();
    assert_eq!(calls.len(), 4);
    let gaps: Vec<_> = calls.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
        ]
    );

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_error_event_triggers_resubscribe() {
    let subscriber = Arc::new(ScriptedSubscriber::new(vec![Ok(vec![
        BusEvent::Subscribed {
            channel: "chat".to_string(),
            kind: "subscribe".to_string(),
            count: 1,
        },
        BusEvent::Error(BusError::Closed),
    ])]));
    let (registry, mut client) = registry_with_client();
    let cancel = CancellationToken::new();
    let bridge = SubscriptionBridge::new(
        subscriber.clone(),
        "chat",
        registry,
        fast_backoff(),
        cancel.clone(),
    );
    let handle = tokio::spawn(bridge.run());

    wait_until(|| subscriber.calls.lock().len() == 2).await;
    assert!(client.try_recv().is_err());

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let subscriber = Arc::new(ScriptedSubscriber::new(
        (0..10).map(|_| Err(subscribe_failure())).collect(),
    ));
    let registry = Arc::new(ConnectionRegistry::new());
    let bridge = SubscriptionBridge::new(
        subscriber.clone(),
        "chat",
        registry,
        BackoffConfig {
            max_attempts: 3,
            ..fast_backoff()
        },
        CancellationToken::new(),
    );
    let state = bridge.state();

    let result = bridge.run().await;

    assert_eq!(
        result,
        Err(BridgeError::ReconnectExhausted {
            channel: "chat".to_string(),
            attempts: 3,
        })
    );
    // The first try plus three retries.
    assert_eq!(subscriber.calls.lock().len(), 4);
    assert_eq!(*state.borrow(), SubscriptionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_stops_bridge() {
    let subscriber = Arc::new(ScriptedSubscriber::new(vec![Err(subscribe_failure())]));
    let registry = Arc::new(ConnectionRegistry::new());
    let cancel = CancellationToken::new();
    let bridge = SubscriptionBridge::new(
        subscriber.clone(),
        "chat",
        registry,
        BackoffConfig {
            initial_delay_ms: 60_000,
            max_delay_ms: 60_000,
            ..fast_backoff()
        },
        cancel.clone(),
    );
    let mut state = bridge.state();
    let handle = tokio::spawn(bridge.run());

    wait_until(|| subscriber.calls.lock().len() == 1).await;
    cancel.cancel();

    handle.await.unwrap().unwrap();
    wait_for(&mut state, SubscriptionState::Stopped).await;
    assert_eq!(subscriber.calls.lock().len(), 1);
}

#[test]
fn test_state_display() {
    assert_eq!(SubscriptionState::Connecting.to_string(), "connecting");
    assert_eq!(SubscriptionState::Subscribed.to_string(), "subscribed");
    assert_eq!(SubscriptionState::Degraded.to_string(), "degraded");
    assert_eq!(SubscriptionState::Stopped.to_string(), "stopped");
}
