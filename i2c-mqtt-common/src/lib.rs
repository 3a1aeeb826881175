//! I2C/MQTT Bridge Common Library
//!
//! This crate provides shared types and utilities for the I2C to MQTT bridge:
//!
//! - [`telemetry`] - Data model (`DeviceAddress`, `Reading`, `Command`, `BridgeStatus`)
//! - [`serialization`] - JSON encoding of readings and decoding of actuator payloads
//! - [`topic`] - Topic builders and address parsing
//! - [`config`] - Configuration types and JSON5 loading
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod serialization;
pub mod telemetry;
pub mod topic;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, MqttConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use serialization::{decode_command_payload, encode_reading};
pub use telemetry::{
    BridgeStatus, Command, DeviceAddress, Reading, current_timestamp_secs, mask_value,
};
pub use topic::{TopicBuilder, address_from_topic, parse_address};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level when set.
///
/// # Example
///
/// ```ignore
/// use i2c_mqtt_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
