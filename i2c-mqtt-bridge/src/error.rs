//! Error types for the bridge.

use thiserror::Error;

use crate::bus::BusError;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// MQTT connection error.
    #[error("MQTT connection error: {0}")]
    MqttConnection(String),

    /// Connection attempts exhausted.
    #[error("Gave up connecting to MQTT after {attempts} attempt(s): {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Publishing error.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// Subscription error.
    #[error("Failed to subscribe to {filter}: {message}")]
    Subscribe { filter: String, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I2C bus error.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl BridgeError {
    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::MqttConnection(msg.into())
    }
}

impl From<i2c_mqtt_common::Error> for BridgeError {
    fn from(err: i2c_mqtt_common::Error) -> Self {
        match err {
            i2c_mqtt_common::Error::Config(msg) => Self::Config(msg),
            other => Self::Serialization(other.to_string()),
        }
    }
}
