//! Bridge lifecycle management.

use std::future::Future;

use tracing::{info, warn};

use crate::actuator::ActuatorHandler;
use crate::bus::BusWorker;
use crate::config::BridgeConfig;
use crate::connection::{ConnectionManager, MqttConnector};
use crate::error::Result;
use crate::poller::Poller;

/// Everything the bridge owns while it runs.
///
/// Handles:
/// - MQTT connection with retry
/// - Actuator message dispatch
/// - The poll loop
/// - Graceful shutdown
///
/// # Example
///
/// ```ignore
/// let worker = BusWorker::spawn(open_linux_bus("/dev/i2c-1")?)?;
/// let connector = RumqttConnector::new(config.mqtt.clone(), config.topics());
///
/// BridgeContext::new(config, connector, worker)
///     .run(async {
///         let _ = tokio::signal::ctrl_c().await;
///     })
///     .await?;
/// ```
pub struct BridgeContext<C: MqttConnector> {
    config: BridgeConfig,
    connection: ConnectionManager<C>,
    bus: BusWorker,
}

impl<C: MqttConnector> BridgeContext<C> {
    pub fn new(config: BridgeConfig, connector: C, bus: BusWorker) -> Self {
        let connection = ConnectionManager::new(connector, config.topics(), &config.mqtt);
        Self {
            config,
            connection,
            bus,
        }
    }

    /// Run the bridge until `shutdown` resolves.
    ///
    /// This will:
    /// 1. Connect to MQTT, retrying until connected or shut down
    /// 2. Spawn the actuator handler on the inbound messages
    /// 3. Poll the bus until `shutdown` resolves
    /// 4. Publish "offline", stop the actuator handler and disconnect
    /// 5. Close the bus
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let connected = tokio::select! {
            result = self.connection.connect() => Some(result),
            () = &mut shutdown => None,
        };

        let (session, inbound) = match connected {
            Some(Ok(connected)) => connected,
            Some(Err(e)) => {
                self.bus.shutdown().await;
                return Err(e);
            }
            None => {
                info!("Shutdown requested before MQTT connection was established");
                self.bus.shutdown().await;
                return Ok(());
            }
        };

        let actuator = tokio::spawn(ActuatorHandler::new(self.bus.handle()).run(inbound));

        let poller = Poller::new(
            self.bus.handle(),
            session,
            self.config.topics(),
            self.config.i2c.addresses.clone(),
            self.config.i2c.publish_interval(),
        );

        info!(
            addresses = self.config.i2c.addresses.len(),
            "I2C bridge running. Press Ctrl+C to stop."
        );

        tokio::select! {
            () = poller.run() => warn!("Poll loop exited unexpectedly"),
            () = &mut shutdown => info!("Received shutdown signal"),
        }

        self.connection.shutdown(Some(actuator)).await;
        self.bus.shutdown().await;

        info!("I2C bridge stopped");
        Ok(())
    }
}
