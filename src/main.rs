//! pubsub-bridge: relays one Redis pub/sub channel to WebSocket clients and
//! publishes what the clients send back onto it.

mod cli;
mod server;
mod signal;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use pubsub_bridge_config::ConfigLoader;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref(), cli.overrides())?;

    server::init_tracing(&config.logging)?;

    let shutdown = CancellationToken::new();
    signal::install(shutdown.clone())?;

    server::run(config, shutdown).await
}
