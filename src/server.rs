//! Bridge startup, wiring and shutdown.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pubsub_bridge_config::{
    Config, ConfigError, ConfigValidator, LoggingConfig, PublishConfig, ReconnectConfig,
    RedisConfig, ServerConfig,
};
use pubsub_bridge_core::{
    BackoffConfig, BusError, BusPublisher, BusSubscriber, ConnectionRegistry, MemoryBus,
    OverflowPolicy, PublishBridge, PublishBridgeConfig, SubscriptionBridge,
};
use pubsub_bridge_redis::{
    open_client, BusAddress, BusBackend, RedisPool, RedisPoolConfig, RedisPublisher,
    RedisSubscriber,
};
use pubsub_bridge_ws::{bind, serve, BridgeState, OriginPolicy, SessionConfig};

/// Initialize tracing with console and optional file output.
///
/// `RUST_LOG` wins over `logging.level`. Files rotate daily and the last 30
/// are kept.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;

    let file_layer = match &logging.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("pubsub-bridge")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // The guard flushes the file writer on drop, so it lives as long as the process.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(logging.json.then(|| fmt::layer().json()))
        .with((!logging.json).then(|| fmt::layer().with_target(true).with_ansi(true)))
        .with(file_layer)
        .init();

    Ok(())
}

/// Run the bridge until `shutdown` is cancelled.
pub(crate) async fn run(config: Config, shutdown: CancellationToken) -> Result<(), Box<dyn Error>> {
    let report = ConfigValidator::validate(&config)?;
    for warning in &report.warnings {
        warn!(field = %warning.path, "{}", warning.message);
    }
    if let Some(err) = report.into_error() {
        return Err(err.into());
    }

    let url = required(&config.redis.url, "redis.url")?;
    let channel = required(&config.redis.channel, "redis.channel")?;
    let listen = config
        .server
        .listen_addr()
        .ok_or_else(|| ConfigError::MissingField("server.bind".to_string()))?;
    let address = BusAddress::parse(url)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bus = %address,
        channel,
        "Starting pubsub-bridge"
    );

    let (subscriber, publisher) = open_bus(&address, &config.redis)?;
    let registry = Arc::new(ConnectionRegistry::new());

    let subscription = SubscriptionBridge::new(
        subscriber,
        channel,
        registry.clone(),
        backoff_config(&config.reconnect),
        shutdown.child_token(),
    );
    let subscription_state = subscription.state();
    let subscription_task = spawn_subscription(subscription);

    let (publish_bridge, worker) = PublishBridge::new(
        publisher,
        channel,
        publish_config(&config.publish)?,
        shutdown.child_token(),
    );
    let worker_task = tokio::spawn(worker.run());

    let state = Arc::new(BridgeState::new(
        registry.clone(),
        publish_bridge,
        OriginPolicy::new(config.server.allowed_origins.iter().map(String::as_str)),
        session_config(&config.server),
        shutdown.clone(),
        subscription_state,
    ));

    let served = match bind(&listen).await {
        Ok(listener) => serve(listener, state).await,
        Err(e) => Err(e),
    };

    shutdown.cancel();
    let closed = registry.close_all();
    if closed > 0 {
        info!(closed, "Closed remaining client connections");
    }
    if let Err(e) = subscription_task.await {
        error!(error = %e, "Subscription task failed");
    }
    if let Err(e) = worker_task.await {
        error!(error = %e, "Publish worker failed");
    }

    served?;
    info!("pubsub-bridge stopped");
    Ok(())
}

/// Run the subscription in the background. Exhausting its reconnect
/// attempts leaves it `Stopped` while the server keeps running.
fn spawn_subscription(subscription: SubscriptionBridge) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = subscription.run().await {
            error!(error = %e, "Subscription stopped, fan-out is down until restart");
        }
    })
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

/// Both bus directions for `address`. A `memory://` bus loops published
/// messages back to the subscription inside this process.
fn open_bus(
    address: &BusAddress,
    redis: &RedisConfig,
) -> Result<(Arc<dyn BusSubscriber>, Arc<dyn BusPublisher>), BusError> {
    match address.backend() {
        BusBackend::Memory => {
            warn!("Using the in-process memory bus; messages never leave this process");
            let bus = Arc::new(MemoryBus::new());
            Ok((bus.clone(), bus))
        }
        BusBackend::Redis => {
            info!(
                tls = address.is_tls(),
                auth = address.password().is_some(),
                max_idle = redis.max_idle,
                "Opening Redis bus"
            );
            let client = open_client(address)?;
            let pool = Arc::new(RedisPool::new(
                client.clone(),
                RedisPoolConfig {
                    max_idle: redis.max_idle,
                    idle_timeout: Duration::from_secs(redis.idle_timeout_secs),
                },
            ));
            Ok((
                Arc::new(RedisSubscriber::new(client)),
                Arc::new(RedisPublisher::new(pool)),
            ))
        }
    }
}

fn session_config(server: &ServerConfig) -> SessionConfig {
    SessionConfig {
        read_timeout: Duration::from_secs(server.read_timeout_secs),
        write_timeout: Duration::from_secs(server.write_timeout_secs),
        ping_interval: Duration::from_secs(server.ping_interval_secs),
        outbound_buffer: server.outbound_buffer,
        max_publish_failures: server.max_publish_failures,
    }
}

fn publish_config(publish: &PublishConfig) -> Result<PublishBridgeConfig, ConfigError> {
    let overflow = match publish.overflow.trim().to_ascii_lowercase().as_str() {
        "block" => OverflowPolicy::Block,
        "reject" => OverflowPolicy::Reject,
        other => {
            return Err(ConfigError::InvalidValue {
                field: "publish.overflow".to_string(),
                message: format!("unknown overflow policy '{other}'"),
            });
        }
    };

    Ok(PublishBridgeConfig {
        queue_capacity: publish.queue_capacity,
        overflow,
        max_retries: publish.max_retries,
        retry: BackoffConfig {
            initial_delay_ms: publish.retry_delay_ms,
            max_delay_ms: publish.retry_max_delay_ms,
            ..BackoffConfig::default()
        },
    })
}

fn backoff_config(reconnect: &ReconnectConfig) -> BackoffConfig {
    BackoffConfig {
        initial_delay_ms: reconnect.initial_delay_ms,
        max_delay_ms: reconnect.max_delay_ms,
        multiplier: reconnect.multiplier,
        jitter: reconnect.jitter,
        max_attempts: reconnect.max_attempts,
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
