//! Bridge between an I2C bus and an MQTT broker.
//!
//! The bridge polls a fixed set of I2C devices and publishes each byte read
//! as a retained JSON reading, and applies actuator messages received over
//! MQTT as single-byte bus writes.
//!
//! # Topics
//!
//! ```text
//! sensors/i2c/<address>     {"addr": 64, "value": 17, "ts": 1700000000.25}   (published, retained)
//! actuators/i2c/<address>   {"value": 12}                                     (subscribed, # wildcard)
//! system/bridge/status      online | offline                                  (retained, last will)
//! ```
//!
//! Where `<address>` is decimal on readings, and decimal or `0x` hex on
//! actuator topics.

pub mod actuator;
pub mod args;
pub mod bus;
pub mod config;
pub mod connection;
pub mod error;
pub mod mqtt;
pub mod poller;
pub mod runner;

pub use args::BridgeArgs;
pub use bus::{BusAdapter, BusError, BusHandle, BusWorker};
pub use config::BridgeConfig;
pub use connection::{
    ConnectionManager, ConnectionState, InboundMessage, MqttConnector, MqttSession,
};
pub use error::{BridgeError, Result};
pub use mqtt::{RumqttConnector, RumqttSession};
pub use poller::{PollStats, Poller};
pub use runner::BridgeContext;
