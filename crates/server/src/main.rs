//! PacketTap - sandbox server with the interception engine attached
//!
//! Starts a sandbox game server of the configured version, injects every
//! connection and logs chat in both directions.

use anyhow::Context;
use packettap::{packets, ListenerOptions, ListenerPriority, ProtocolManager, TapConfig};
use packettap_sandbox::{SandboxHost, SandboxServer};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = TapConfig::load_default();

    let default_filter = config.as_ref().map_or("info", |config| config.log_filter());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = config.context("loading packettap.txt")?;
    info!("PacketTap starting up...");
    config.display();

    let host = Arc::new(SandboxHost::new(config.server_version));
    let bind_address = config.bind_address;
    let manager = Arc::new(ProtocolManager::initialize(
        host.version().clone(),
        host.clone(),
        config,
    )?);

    manager.register_listener(
        &[packets::play::client::CHAT],
        ListenerOptions::new().named("chat-log").priority(ListenerPriority::MONITOR),
        |event| {
            let message: String = event.packet().read(0)?;
            info!("{} says: {}", event.player().unwrap_or("?"), message);
            Ok(())
        },
    )?;

    let hook_manager = manager.clone();
    let server = SandboxServer::bind(bind_address, host)
        .await?
        .on_connect(move |channel| {
            if let Err(e) = hook_manager.inject_channel(channel) {
                warn!("Connection {} is not intercepted: {}", channel.id(), e);
            }
        });

    info!("Server is ready to accept connections on {}", server.local_addr()?);
    let result = server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for ctrl-c: {}", e);
            }
        })
        .await;

    let detached = manager.shutdown_all().await;
    info!("Detached {} connection(s)", detached);
    for stats in manager.timings() {
        info!(
            "Listener {}: {} call(s), average {:?}, longest {:?}",
            stats.name,
            stats.invocations,
            stats.average(),
            stats.longest
        );
    }

    result.map_err(Into::into)
}
