//! Configuration for the I2C bridge.
//!
//! Settings are layered: built-in defaults, then an optional JSON5 file,
//! then environment variables.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use i2c_mqtt_common::topic::{
    DEFAULT_ACT_TOPIC_PREFIX, DEFAULT_STATUS_TOPIC, DEFAULT_TOPIC_PREFIX, validate_prefix,
};
use i2c_mqtt_common::{
    DeviceAddress, LogFormat, LoggingConfig, MqttConfig, TopicBuilder, parse_address,
};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Device addresses polled when none are configured.
pub const DEFAULT_ADDRESSES: [u8; 3] = [0x40, 0x41, 0x42];

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// MQTT connection settings
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// I2C bus and polling settings
    #[serde(default)]
    pub i2c: I2cConfig,

    /// Topic layout
    #[serde(default)]
    pub topics: TopicsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// I2C bus and polling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct I2cConfig {
    /// Bus number, opened as `/dev/i2c-<bus_id>`
    #[serde(default = "default_bus_id")]
    pub bus_id: u32,

    /// Device addresses polled every cycle, in order
    #[serde(default = "default_addresses")]
    pub addresses: Vec<DeviceAddress>,

    /// Seconds to sleep between poll cycles
    #[serde(default = "default_publish_interval")]
    pub publish_interval_secs: f64,
}

fn default_bus_id() -> u32 {
    1
}

fn default_addresses() -> Vec<DeviceAddress> {
    DEFAULT_ADDRESSES
        .iter()
        .filter_map(|&raw| DeviceAddress::new(raw))
        .collect()
}

fn default_publish_interval() -> f64 {
    1.0
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            bus_id: default_bus_id(),
            addresses: default_addresses(),
            publish_interval_secs: default_publish_interval(),
        }
    }
}

impl I2cConfig {
    /// Device node for the configured bus.
    pub fn device_path(&self) -> String {
        format!("/dev/i2c-{}", self.bus_id)
    }

    /// Interval between poll cycles.
    pub fn publish_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.publish_interval_secs).unwrap_or(Duration::ZERO)
    }
}

/// MQTT topic configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicsConfig {
    /// Prefix for published readings
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Prefix of the actuator subtree
    #[serde(default = "default_act_topic_prefix")]
    pub act_topic_prefix: String,

    /// Retained status / last-will topic
    #[serde(default = "default_status_topic")]
    pub status_topic: String,
}

fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

fn default_act_topic_prefix() -> String {
    DEFAULT_ACT_TOPIC_PREFIX.to_string()
}

fn default_status_topic() -> String {
    DEFAULT_STATUS_TOPIC.to_string()
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
            act_topic_prefix: default_act_topic_prefix(),
            status_topic: default_status_topic(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration: defaults or the given JSON5 file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON5 file, without environment overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let config: BridgeConfig = i2c_mqtt_common::load_config(path)?;
        Ok(config)
    }

    /// Override settings from environment variables.
    ///
    /// `lookup` resolves a variable name to its value; unset or empty
    /// variables leave the current setting untouched.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = get("MQTT_PORT") {
            self.mqtt.port = parse_env("MQTT_PORT", &port)?;
        }
        if let Some(client_id) = get("MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Some(keep_alive) = get("MQTT_KEEP_ALIVE_SEC") {
            self.mqtt.keep_alive_secs = parse_env("MQTT_KEEP_ALIVE_SEC", &keep_alive)?;
        }
        if let Some(delay) = get("MQTT_RETRY_DELAY_SEC") {
            self.mqtt.retry_delay_secs = parse_env("MQTT_RETRY_DELAY_SEC", &delay)?;
        }
        if let Some(retries) = get("MQTT_MAX_RETRIES") {
            let cap: u32 = parse_env("MQTT_MAX_RETRIES", &retries)?;
            self.mqtt.max_connect_attempts = (cap > 0).then_some(cap);
        }
        if let Some(prefix) = get("TOPIC_PREFIX") {
            self.topics.topic_prefix = prefix;
        }
        if let Some(prefix) = get("ACT_TOPIC_PREFIX") {
            self.topics.act_topic_prefix = prefix;
        }
        if let Some(topic) = get("STATUS_TOPIC") {
            self.topics.status_topic = topic;
        }
        if let Some(bus_id) = get("I2C_BUS_ID") {
            self.i2c.bus_id = parse_env("I2C_BUS_ID", &bus_id)?;
        }
        if let Some(addresses) = get("I2C_ADDRESSES") {
            self.i2c.addresses = parse_address_list(&addresses)?;
        }
        if let Some(interval) = get("PUBLISH_INTERVAL_SEC") {
            self.i2c.publish_interval_secs = parse_env("PUBLISH_INTERVAL_SEC", &interval)?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = get("LOG_FORMAT") {
            self.logging.format = format.parse::<LogFormat>().map_err(BridgeError::from)?;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.host.trim().is_empty() {
            return Err(BridgeError::validation("MQTT host cannot be empty"));
        }

        if self.mqtt.client_id.is_empty() {
            return Err(BridgeError::validation("MQTT client id cannot be empty"));
        }

        if !self.mqtt.retry_delay_secs.is_finite() || self.mqtt.retry_delay_secs < 0.0 {
            return Err(BridgeError::validation(format!(
                "retry delay must be a non-negative number of seconds, got {}",
                self.mqtt.retry_delay_secs
            )));
        }

        if !self.i2c.publish_interval_secs.is_finite() || self.i2c.publish_interval_secs <= 0.0 {
            return Err(BridgeError::validation(format!(
                "publish interval must be greater than zero, got {}",
                self.i2c.publish_interval_secs
            )));
        }

        if self.i2c.addresses.is_empty() {
            return Err(BridgeError::validation(
                "At least one I2C address must be configured",
            ));
        }

        let mut seen = HashSet::new();
        for address in &self.i2c.addresses {
            if !seen.insert(*address) {
                return Err(BridgeError::validation(format!(
                    "I2C address {} is listed more than once",
                    address
                )));
            }
        }

        validate_prefix("topic prefix", &self.topics.topic_prefix)
            .map_err(|e| BridgeError::validation(e.to_string()))?;
        validate_prefix("actuator topic prefix", &self.topics.act_topic_prefix)
            .map_err(|e| BridgeError::validation(e.to_string()))?;
        validate_prefix("status topic", &self.topics.status_topic)
            .map_err(|e| BridgeError::validation(e.to_string()))?;

        Ok(())
    }

    /// Topic builder for the configured layout.
    pub fn topics(&self) -> TopicBuilder {
        TopicBuilder::new(
            &self.topics.topic_prefix,
            &self.topics.act_topic_prefix,
            &self.topics.status_topic,
        )
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| BridgeError::ConfigParse(format!("{}='{}': {}", name, value, e)))
}

/// Parse a comma-separated list of decimal or `0x` hex addresses.
pub fn parse_address_list(value: &str) -> Result<Vec<DeviceAddress>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let raw = parse_address(s).ok_or_else(|| {
                BridgeError::ConfigParse(format!("I2C_ADDRESSES: '{}' is not an address", s))
            })?;
            DeviceAddress::try_from(raw)
                .map_err(|e| BridgeError::validation(format!("I2C_ADDRESSES: {}", e)))
        })
        .collect()
}
