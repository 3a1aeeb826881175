use crate::error::{Error, Result};
use crate::telemetry::DeviceAddress;

/// Default prefix for published readings.
pub const DEFAULT_TOPIC_PREFIX: &str = "sensors/i2c";

/// Default prefix of the actuator topic subtree.
pub const DEFAULT_ACT_TOPIC_PREFIX: &str = "actuators/i2c";

/// Default retained bridge status topic.
pub const DEFAULT_STATUS_TOPIC: &str = "system/bridge/status";

/// Builder for the bridge's MQTT topics.
///
/// Topics follow the patterns:
/// - `<topic_prefix>/<address>` for readings (decimal address)
/// - `<act_topic_prefix>/#` for the actuator subscription
/// - a single fixed status topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    topic_prefix: String,
    act_topic_prefix: String,
    status_topic: String,
}

impl Default for TopicBuilder {
    fn default() -> Self {
        Self::new(
            DEFAULT_TOPIC_PREFIX,
            DEFAULT_ACT_TOPIC_PREFIX,
            DEFAULT_STATUS_TOPIC,
        )
    }
}

impl TopicBuilder {
    pub fn new(
        topic_prefix: impl Into<String>,
        act_topic_prefix: impl Into<String>,
        status_topic: impl Into<String>,
    ) -> Self {
        Self {
            topic_prefix: trim_trailing_slash(topic_prefix.into()),
            act_topic_prefix: trim_trailing_slash(act_topic_prefix.into()),
            status_topic: status_topic.into(),
        }
    }

    /// Topic a reading for `address` is published to.
    ///
    /// # Example
    /// ```
    /// use i2c_mqtt_common::topic::TopicBuilder;
    /// use i2c_mqtt_common::telemetry::DeviceAddress;
    ///
    /// let topics = TopicBuilder::default();
    /// let addr = DeviceAddress::new(0x40).unwrap();
    /// assert_eq!(topics.reading_topic(addr), "sensors/i2c/64");
    /// ```
    pub fn reading_topic(&self, address: DeviceAddress) -> String {
        format!("{}/{}", self.topic_prefix, address.get())
    }

    /// Wildcard filter covering the whole actuator subtree.
    ///
    /// # Example
    /// ```
    /// use i2c_mqtt_common::topic::TopicBuilder;
    ///
    /// assert_eq!(TopicBuilder::default().actuator_filter(), "actuators/i2c/#");
    /// ```
    pub fn actuator_filter(&self) -> String {
        format!("{}/#", self.act_topic_prefix)
    }

    /// Retained status topic (also the last-will topic).
    pub fn status_topic(&self) -> &str {
        &self.status_topic
    }

    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    pub fn act_topic_prefix(&self) -> &str {
        &self.act_topic_prefix
    }
}

fn trim_trailing_slash(mut prefix: String) -> String {
    while prefix.len() > 1 && prefix.ends_with('/') {
        prefix.pop();
    }
    prefix
}

/// Parse an address segment as a decimal or `0x`-prefixed hexadecimal literal.
///
/// Returns `None` for anything else (empty input, signs, whitespace,
/// overflow), which callers treat as an invalid address.
///
/// # Example
/// ```
/// use i2c_mqtt_common::topic::parse_address;
///
/// assert_eq!(parse_address("65"), Some(65));
/// assert_eq!(parse_address("0x41"), Some(0x41));
/// assert_eq!(parse_address("lamp"), None);
/// ```
pub fn parse_address(segment: &str) -> Option<u32> {
    let (digits, radix) = match segment
        .strip_prefix("0x")
        .or_else(|| segment.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None => (segment, 10),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    u32::from_str_radix(digits, radix).ok()
}

/// Extract the device address from the last segment of an actuator topic.
pub fn address_from_topic(topic: &str) -> Result<DeviceAddress> {
    let segment = topic.rsplit('/').next().unwrap_or_default();
    let raw = parse_address(segment)
        .ok_or_else(|| Error::Topic(format!("'{}' has no address segment", topic)))?;
    DeviceAddress::try_from(raw)
}

/// Check that a topic prefix is usable for publishing and subscribing.
pub fn validate_prefix(name: &str, prefix: &str) -> Result<()> {
    if prefix.trim_matches('/').is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", name)));
    }
    if prefix.contains(['#', '+']) {
        return Err(Error::Config(format!(
            "{} '{}' must not contain MQTT wildcards",
            name, prefix
        )));
    }
    Ok(())
}
