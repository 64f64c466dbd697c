//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Replace file values with any override that is set.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.redis_url {
            self.redis.url = Some(url);
        }
        if let Some(channel) = overrides.redis_channel {
            self.redis.channel = Some(channel);
        }
        if let Some(bind) = overrides.bind {
            self.server.bind = Some(bind);
        }
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub redis_url: Option<String>,
    pub redis_channel: Option<String>,
    pub bind: Option<String>,
}

/// HTTP/WebSocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. `0.0.0.0:8080`. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Origins allowed to open a WebSocket. `"*"` allows any.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Evict a client that sends nothing (not even a pong) for this long.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Frames that may wait for a slow client before it is evicted.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Consecutive rejected publishes before a session is closed. 0 disables.
    #[serde(default = "default_max_publish_failures")]
    pub max_publish_failures: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: None,
            allowed_origins: default_allowed_origins(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            ping_interval_secs: default_ping_interval(),
            outbound_buffer: default_outbound_buffer(),
            max_publish_failures: default_max_publish_failures(),
        }
    }
}

impl ServerConfig {
    /// The bind address in a form the listener accepts. A bare `:port`
    /// listens on all interfaces.
    pub fn listen_addr(&self) -> Option<String> {
        self.bind.as_deref().map(|bind| match bind.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => bind.to_string(),
        })
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_read_timeout() -> u64 {
    60
}

fn default_write_timeout() -> u64 {
    10
}

fn default_ping_interval() -> u64 {
    20
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_max_publish_failures() -> u32 {
    5
}

/// Bus connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `redis://`, `rediss://` or `memory://` address. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// The single channel bridged in both directions. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Idle connections kept by the publish pool.
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,

    /// Idle connections older than this are closed instead of reused.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            channel: None,
            max_idle: default_max_idle(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

fn default_max_idle() -> usize {
    3
}

fn default_idle_timeout() -> u64 {
    240
}

/// Client → bus publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// `block` or `reject`.
    #[serde(default = "default_overflow")]
    pub overflow: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            overflow: default_overflow(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_overflow() -> String {
    "block".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    50
}

fn default_retry_max_delay() -> u64 {
    1_000
}

/// Resubscribe schedule for the bus subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Fraction of each delay randomised, 0.0 to 1.0.
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// 0 retries forever.
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_attempts: 0,
        }
    }
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

/// Logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    /// Also write daily-rotated log files here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
