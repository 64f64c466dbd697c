//! CLI definitions for pubsub-bridge.

use std::path::PathBuf;

use clap::Parser;
use pubsub_bridge_config::ConfigOverrides;

/// pubsub-bridge CLI.
#[derive(Debug, Parser)]
#[command(name = "pubsub-bridge")]
#[command(about = "Bridge a Redis pub/sub channel to WebSocket clients")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bus address: redis://, rediss:// or memory://
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Channel bridged in both directions
    #[arg(long, env = "REDIS_KEY")]
    pub redis_key: Option<String>,

    /// Listen address, e.g. `:8080` or `127.0.0.1:8080`
    #[arg(long, env = "BIND")]
    pub bind: Option<String>,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            redis_url: self.redis_url.clone(),
            redis_channel: self.redis_key.clone(),
            bind: self.bind.clone(),
        }
    }
}
