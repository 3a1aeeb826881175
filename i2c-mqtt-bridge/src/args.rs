//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Bridge an I2C bus to an MQTT broker.
///
/// Settings come from the optional JSON5 file, then the environment
/// (`MQTT_HOST`, `TOPIC_PREFIX`, `I2C_BUS_ID`, ...), then these flags.
#[derive(Parser, Debug, Clone)]
#[command(name = "i2c-mqtt-bridge")]
#[command(about = "Polls I2C devices and publishes readings to MQTT")]
#[command(version)]
pub struct BridgeArgs {
    /// Path to an optional configuration file (JSON5 format).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}
