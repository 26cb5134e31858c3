//! miracastd — Wi-Fi Display control daemon.

use anyhow::{Context, Result};
use miracast_core::config::MiracastConfig;
use miracast_core::peer::NetworkDevice;

use miracastd::firmware::NoFirmware;
use miracastd::manager::{Delegate, NetworkManager};

/// Reflects peer lifecycle into the log. The system-bus façade that exposes
/// peers to external callers plugs in here.
struct LoggingDelegate;

impl Delegate for LoggingDelegate {
    fn on_device_found(&mut self, device: &NetworkDevice) {
        tracing::info!(address = %device.address, name = %device.name, "device found");
    }

    fn on_device_lost(&mut self, device: &NetworkDevice) {
        tracing::info!(address = %device.address, "device lost");
    }

    fn on_device_state_changed(&mut self, device: &NetworkDevice) {
        tracing::info!(address = %device.address, state = %device.state, "device state changed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = MiracastConfig::load().context("failed to load configuration")?;
    if let Some(interface) = std::env::args().nth(1) {
        config.network.interface = interface;
    }
    tracing::info!(interface = %config.network.interface, "miracastd starting");

    let (mut manager, handle) =
        NetworkManager::new(&config, Box::new(LoggingDelegate), Box::new(NoFirmware));
    manager.setup();
    let manager_task = tokio::spawn(manager.run());

    tokio::signal::ctrl_c().await.context("failed to wait for ctrl-c")?;
    tracing::info!("shutting down");
    handle.shutdown().await?;
    manager_task.await.context("manager task panicked")?;

    Ok(())
}
