//! Applies actuator messages as bus writes.

use i2c_mqtt_common::{Command, address_from_topic, decode_command_payload};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bus::{BusError, BusHandle};
use crate::connection::InboundMessage;

/// What happened to one actuator message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The masked value was written.
    Applied(Command),
    /// The topic did not end in a valid 7-bit address.
    InvalidAddress,
    /// The payload could not be decoded.
    InvalidPayload,
    /// The bus write failed.
    WriteFailed(Command),
}

/// Decodes actuator messages and writes them to the bus.
#[derive(Debug, Clone)]
pub struct ActuatorHandler {
    bus: BusHandle,
}

impl ActuatorHandler {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus }
    }

    /// Consume messages until the channel closes.
    ///
    /// A bad message never stops the loop.
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundMessage>) {
        info!("Actuator handler started");

        while let Some(message) = inbound.recv().await {
            self.handle(&message).await;
        }

        debug!("Actuator channel closed");
    }

    /// Handle a single inbound message.
    pub async fn handle(&self, message: &InboundMessage) -> Outcome {
        let address = match address_from_topic(&message.topic) {
            Ok(address) => address,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Dropping actuator message");
                return Outcome::InvalidAddress;
            }
        };

        let raw = match decode_command_payload(&message.payload) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Dropping actuator message");
                return Outcome::InvalidPayload;
            }
        };

        let command = Command::masked(address, raw);
        match self.bus.write(command.address, raw).await {
            Ok(_) => Outcome::Applied(command),
            Err(BusError::WorkerStopped) => {
                warn!(address = %command.address, "I2C bus closed, dropping actuator write");
                Outcome::WriteFailed(command)
            }
            // Logged by the bus adapter
            Err(_) => Outcome::WriteFailed(command),
        }
    }
}
