//! I2C to MQTT bridge.
//!
//! Polls I2C devices and publishes their values to MQTT, and writes
//! actuator commands received over MQTT to the bus.

use anyhow::{Context, Result};
use clap::Parser;
use i2c_mqtt_bridge::{BridgeArgs, BridgeConfig, BridgeContext, BusWorker, RumqttConnector};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse();

    // Load configuration
    let mut config = BridgeConfig::load(args.config.as_deref())
        .context("Failed to load bridge configuration")?;

    // Initialize logging
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    i2c_mqtt_common::init_tracing(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting i2c-mqtt-bridge");
    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    // Open the bus once for the whole run
    let bus = start_bus(&config)?;

    let connector = RumqttConnector::new(config.mqtt.clone(), config.topics());
    BridgeContext::new(config, connector, bus)
        .run(shutdown_signal())
        .await?;

    info!("Goodbye!");
    Ok(())
}

#[cfg(target_os = "linux")]
fn start_bus(config: &BridgeConfig) -> Result<BusWorker> {
    let path = config.i2c.device_path();
    let adapter = i2c_mqtt_bridge::bus::open_linux_bus(&path)?;
    BusWorker::spawn(adapter).context("Failed to start I2C bus worker")
}

#[cfg(not(target_os = "linux"))]
fn start_bus(_config: &BridgeConfig) -> Result<BusWorker> {
    anyhow::bail!("I2C bus access requires the Linux i2c-dev interface")
}

/// Resolve on Ctrl+C, or on SIGTERM where available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
