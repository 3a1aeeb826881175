//! I2C device polling and reading publishing.

use std::time::Duration;

use i2c_mqtt_common::{DeviceAddress, Reading, TopicBuilder, current_timestamp_secs, encode_reading};
use tracing::{debug, info, warn};

use crate::bus::{BusError, BusHandle};
use crate::connection::MqttSession;

/// Outcome of a single poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    /// Readings published.
    pub published: usize,
    /// Addresses whose read failed.
    pub skipped: usize,
    /// Readings that could not be published.
    pub failed: usize,
}

/// Polls every configured address and publishes the readings.
pub struct Poller<S> {
    bus: BusHandle,
    session: S,
    topics: TopicBuilder,
    addresses: Vec<DeviceAddress>,
    interval: Duration,
}

impl<S: MqttSession> Poller<S> {
    pub fn new(
        bus: BusHandle,
        session: S,
        topics: TopicBuilder,
        addresses: Vec<DeviceAddress>,
        interval: Duration,
    ) -> Self {
        Self {
            bus,
            session,
            topics,
            addresses,
            interval,
        }
    }

    /// Run the polling loop until the task is dropped or cancelled.
    pub async fn run(&self) {
        info!(
            addresses = self.addresses.len(),
            interval = ?self.interval,
            "Starting I2C poller"
        );

        loop {
            let stats = self.poll_once().await;
            debug!(
                published = stats.published,
                skipped = stats.skipped,
                failed = stats.failed,
                "Poll cycle complete"
            );

            tokio::time::sleep(self.interval).await;
        }
    }

    /// Perform a single poll cycle.
    ///
    /// All readings of a cycle share one timestamp. A failed read skips that
    /// address only.
    pub async fn poll_once(&self) -> PollStats {
        let timestamp = current_timestamp_secs();
        let mut stats = PollStats::default();

        for &address in &self.addresses {
            let value = match self.bus.read(address).await {
                Ok(value) => value,
                Err(BusError::WorkerStopped) => {
                    warn!(%address, "I2C bus closed, skipping read");
                    stats.skipped += 1;
                    continue;
                }
                Err(_) => {
                    // Logged by the bus adapter
                    stats.skipped += 1;
                    continue;
                }
            };

            let reading = Reading::new(address, value, timestamp);
            if self.publish(&reading).await {
                stats.published += 1;
            } else {
                stats.failed += 1;
            }
        }

        stats
    }

    async fn publish(&self, reading: &Reading) -> bool {
        let topic = self.topics.reading_topic(reading.address);

        let payload = match encode_reading(reading) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode reading");
                return false;
            }
        };

        match self.session.publish(&topic, payload, true).await {
            Ok(()) => {
                debug!(topic = %topic, value = reading.value, "Published reading");
                true
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to publish reading");
                false
            }
        }
    }
}
