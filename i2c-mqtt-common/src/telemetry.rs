use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A 7-bit I2C device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    /// Highest address addressable with 7-bit addressing.
    pub const MAX: u8 = 0x7F;

    /// Create an address, rejecting anything outside the 7-bit range.
    pub fn new(raw: u8) -> Option<Self> {
        (raw <= Self::MAX).then_some(Self(raw))
    }

    /// The raw address byte.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u32> for DeviceAddress {
    type Error = Error;

    fn try_from(raw: u32) -> Result<Self> {
        u8::try_from(raw)
            .ok()
            .and_then(DeviceAddress::new)
            .ok_or_else(|| Error::Topic(format!("address {} is outside 0x00..=0x7F", raw)))
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u32::deserialize(deserializer)?;
        DeviceAddress::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Mask an arbitrary integer into the byte range written to the bus.
///
/// Two's-complement semantics: `-1` becomes `0xFF`, `300` becomes `44`.
pub fn mask_value(raw: i64) -> u8 {
    (raw & 0xFF) as u8
}

/// A single register value read from a device during a poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Device the value was read from.
    #[serde(rename = "addr")]
    pub address: DeviceAddress,

    /// Byte read from the device.
    pub value: u8,

    /// Seconds since the Unix epoch, shared by every reading of one cycle.
    #[serde(rename = "ts")]
    pub timestamp: f64,
}

impl Reading {
    pub fn new(address: DeviceAddress, value: u8, timestamp: f64) -> Self {
        Self {
            address,
            value,
            timestamp,
        }
    }
}

/// A write request decoded from an actuator message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub address: DeviceAddress,
    pub value: u8,
}

impl Command {
    /// Build a command, masking the raw value into a byte.
    pub fn masked(address: DeviceAddress, raw: i64) -> Self {
        Self {
            address,
            value: mask_value(raw),
        }
    }
}

/// Bridge liveness as seen by subscribers of the status topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeStatus {
    Online,
    Offline,
}

impl BridgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeStatus::Online => "online",
            BridgeStatus::Offline => "offline",
        }
    }

    /// Wire payload: the bare status string, not JSON-quoted.
    pub fn payload(&self) -> Vec<u8> {
        self.as_str().as_bytes().to_vec()
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Get the current timestamp in fractional seconds since the Unix epoch.
pub fn current_timestamp_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_address_range() {
        assert_eq!(DeviceAddress::new(0x40).map(DeviceAddress::get), Some(0x40));
        assert_eq!(DeviceAddress::new(0x7F).map(DeviceAddress::get), Some(0x7F));
        assert!(DeviceAddress::new(0x80).is_none());
        assert!(DeviceAddress::try_from(300u32).is_err());
        assert!(DeviceAddress::try_from(0x41u32).is_ok());
    }

    #[test]
    fn test_device_address_display() {
        let addr = DeviceAddress::new(0x0A).unwrap();
        assert_eq!(addr.to_string(), "0x0A");
    }

    #[test]
    fn test_mask_value() {
        assert_eq!(mask_value(0), 0);
        assert_eq!(mask_value(255), 255);
        assert_eq!(mask_value(256), 0);
        assert_eq!(mask_value(300), 44);
        assert_eq!(mask_value(-1), 255);
        assert_eq!(mask_value(-256), 0);
        assert_eq!(mask_value(i64::MIN), 0);
        assert_eq!(mask_value(i64::MAX), 255);
    }

    #[test]
    fn test_mask_matches_bitwise_and() {
        for raw in (-1024i64..1024).chain([i64::MIN, i64::MAX, 65_535, 1 << 40]) {
            assert_eq!(mask_value(raw) as i64, raw & 0xFF, "raw = {}", raw);
        }
    }

    #[test]
    fn test_command_masked() {
        let addr = DeviceAddress::new(0x41).unwrap();
        let cmd = Command::masked(addr, 300);
        assert_eq!(cmd.address, addr);
        assert_eq!(cmd.value, 44);
    }

    #[test]
    fn test_reading_wire_names() {
        let reading = Reading::new(DeviceAddress::new(0x40).unwrap(), 17, 1_700_000_000.5);
        let json: serde_json::Value = serde_json::to_value(&reading).unwrap();

        assert_eq!(json["addr"], 64);
        assert_eq!(json["value"], 17);
        assert_eq!(json["ts"], 1_700_000_000.5);
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_status_payload() {
        assert_eq!(BridgeStatus::Online.payload(), b"online");
        assert_eq!(BridgeStatus::Offline.payload(), b"offline");
        assert_eq!(BridgeStatus::Offline.to_string(), "offline");
    }

    #[test]
    fn test_current_timestamp_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(current_timestamp_secs() > 1_577_836_800.0);
    }
}
