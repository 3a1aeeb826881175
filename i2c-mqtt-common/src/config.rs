use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default MQTT broker host (the compose service name).
pub const DEFAULT_MQTT_HOST: &str = "mosquitto";

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default client identifier presented to the broker.
pub const DEFAULT_CLIENT_ID: &str = "rpi-i2c-bridge";

/// MQTT connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or IP address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Fixed delay between connection attempts, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,

    /// Maximum number of connection attempts. `None` retries forever.
    #[serde(default)]
    pub max_connect_attempts: Option<u32>,
}

fn default_host() -> String {
    DEFAULT_MQTT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_retry_delay() -> f64 {
    2.0
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
            retry_delay_secs: default_retry_delay(),
            max_connect_attempts: None,
        }
    }
}

impl MqttConfig {
    /// Delay between connection attempts.
    ///
    /// Negative or non-finite values collapse to zero; validation rejects
    /// them before a bridge ever starts.
    pub fn retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_delay_secs).unwrap_or(Duration::ZERO)
    }

    /// Keep-alive interval.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!(
                "Invalid log format '{}'. Expected 'text' or 'json'",
                other
            ))),
        }
    }
}

/// Common logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&content).map_err(|e| match e {
        Error::Config(msg) => Error::Config(format!("{} ({})", msg, path.display())),
        other => other,
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        mqtt: MqttConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_parse_mqtt_config() {
        let json5 = r#"
        {
            mqtt: {
                host: "broker.local",
                port: 8883,
                retry_delay_secs: 0.5,
                max_connect_attempts: 3,
            },
            logging: {
                level: "debug",
            },
        }
        "#;

        let config: TestConfig = parse_config(json5).unwrap();

        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.mqtt.retry_delay(), Duration::from_millis(500));
        assert_eq!(config.mqtt.max_connect_attempts, Some(3));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_default_config() {
        let config: TestConfig = parse_config("{}").unwrap();

        assert_eq!(config.mqtt.host, "mosquitto");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.mqtt.keep_alive(), Duration::from_secs(60));
        assert!(config.mqtt.max_connect_attempts.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_json_logging_format() {
        let json5 = r#"{ logging: { level: "debug", format: "json" } }"#;

        let config: TestConfig = parse_config(json5).unwrap();

        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" text ".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_negative_retry_delay_collapses_to_zero() {
        let config = MqttConfig {
            retry_delay_secs: -1.0,
            ..MqttConfig::default()
        };
        assert_eq!(config.retry_delay(), Duration::ZERO);
    }

    #[test]
    fn test_load_missing_file() {
        let result: Result<TestConfig> = load_config("/nonexistent/bridge.json5");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
