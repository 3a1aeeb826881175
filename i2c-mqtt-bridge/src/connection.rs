//! MQTT session lifecycle.
//!
//! [`ConnectionManager`] drives connect-with-retry, the actuator subscription,
//! the retained online/offline status and the best-effort teardown. The
//! transport itself sits behind [`MqttConnector`] and [`MqttSession`] so the
//! lifecycle can be exercised without a broker; the production transport lives
//! in [`crate::mqtt`].

use std::future::Future;
use std::time::Duration;

use i2c_mqtt_common::{BridgeStatus, MqttConfig, TopicBuilder};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};

/// An MQTT message received on the actuator subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// An established MQTT session.
///
/// Every operation uses at-least-once delivery (QoS 1).
pub trait MqttSession: Clone + Send + Sync + 'static {
    /// Publish a payload to a topic.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Subscribe to a topic filter.
    fn subscribe(&self, filter: &str) -> impl Future<Output = Result<()>> + Send;

    /// Close the session cleanly, flushing anything already queued.
    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Factory for MQTT sessions.
pub trait MqttConnector: Send + Sync {
    type Session: MqttSession;

    /// Open a session with the last will already registered.
    ///
    /// Inbound publishes are delivered on the returned receiver until the
    /// session is disconnected.
    fn connect(
        &self,
    ) -> impl Future<Output = Result<(Self::Session, mpsc::Receiver<InboundMessage>)>> + Send;
}

/// Owns the MQTT session for the lifetime of the bridge.
pub struct ConnectionManager<C: MqttConnector> {
    connector: C,
    topics: TopicBuilder,
    retry_delay: Duration,
    max_attempts: Option<u32>,
    state: watch::Sender<ConnectionState>,
    session: Option<C::Session>,
}

impl<C: MqttConnector> ConnectionManager<C> {
    pub fn new(connector: C, topics: TopicBuilder, mqtt: &MqttConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            topics,
            retry_delay: mqtt.retry_delay(),
            max_attempts: mqtt.max_connect_attempts,
            state,
            session: None,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The established session, if connected.
    pub fn session(&self) -> Option<&C::Session> {
        self.session.as_ref()
    }

    /// Connect, retrying on a fixed delay until it succeeds.
    ///
    /// On success the actuator filter is subscribed and a retained `online`
    /// status is published. Gives up only when `max_connect_attempts` is set
    /// and reached.
    pub async fn connect(&mut self) -> Result<(C::Session, mpsc::Receiver<InboundMessage>)> {
        let filter = self.topics.actuator_filter();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.set_state(ConnectionState::Connecting);
            info!(attempt, "Connecting to MQTT");

            let error = match self.try_connect(&filter).await {
                Ok((session, inbound)) => {
                    self.set_state(ConnectionState::Connected);
                    info!(filter = %filter, "Connected to MQTT");

                    if let Err(e) = self.publish_status(&session, BridgeStatus::Online).await {
                        warn!(error = %e, "Failed to publish online status");
                    }

                    self.session = Some(session.clone());
                    return Ok((session, inbound));
                }
                Err(e) => e,
            };

            self.set_state(ConnectionState::Disconnected);

            if self.max_attempts.is_some_and(|max| attempt >= max) {
                return Err(BridgeError::RetriesExhausted {
                    attempts: attempt,
                    last_error: error.to_string(),
                });
            }

            warn!(
                attempt,
                error = %error,
                retry_in = ?self.retry_delay,
                "MQTT connect failed, retrying"
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    async fn try_connect(
        &self,
        filter: &str,
    ) -> Result<(C::Session, mpsc::Receiver<InboundMessage>)> {
        let (session, inbound) = self.connector.connect().await?;

        if let Err(e) = session.subscribe(filter).await {
            if let Err(close_err) = session.disconnect().await {
                debug!(error = %close_err, "Failed to close half-open session");
            }
            return Err(e);
        }

        Ok((session, inbound))
    }

    async fn publish_status(&self, session: &C::Session, status: BridgeStatus) -> Result<()> {
        session
            .publish(self.topics.status_topic(), status.payload(), true)
            .await
    }

    /// Tear the session down.
    ///
    /// Publishes a retained `offline` status, stops the receive path, then
    /// disconnects. Each step is attempted even if an earlier one fails.
    pub async fn shutdown(&mut self, receive_path: Option<JoinHandle<()>>) {
        let session = self.session.take();

        if let Some(session) = &session {
            match self.publish_status(session, BridgeStatus::Offline).await {
                Ok(()) => debug!("Published offline status"),
                Err(e) => warn!(error = %e, "Failed to publish offline status"),
            }
        }

        if let Some(task) = receive_path {
            task.abort();
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(error = %e, "Actuator receive path ended abnormally"),
            }
        }

        if let Some(session) = &session {
            if let Err(e) = session.disconnect().await {
                warn!(error = %e, "Error disconnecting from MQTT");
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("MQTT session closed");
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Publish(String, Vec<u8>, bool),
        Subscribe(String),
        Disconnect,
    }

    #[derive(Clone, Default)]
    struct RecordingSession {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_subscribe: bool,
    }

    impl MqttSession for RecordingSession {
        async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Publish(topic.to_string(), payload, retain));
            Ok(())
        }

        async fn subscribe(&self, filter: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Subscribe(filter.to_string()));
            if self.fail_subscribe {
                return Err(BridgeError::Subscribe {
                    filter: filter.to_string(),
                    message: "not authorized".to_string(),
                });
            }
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Disconnect);
            Ok(())
        }
    }

    struct FlakyConnector {
        failures: u32,
        attempts: AtomicU32,
        session: RecordingSession,
    }

    impl MqttConnector for FlakyConnector {
        type Session = RecordingSession;

        async fn connect(&self) -> Result<(RecordingSession, mpsc::Receiver<InboundMessage>)> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(BridgeError::connection("connection refused"));
            }
            let (_tx, rx) = mpsc::channel(1);
            Ok((self.session.clone(), rx))
        }
    }

    fn manager(failures: u32, max_attempts: Option<u32>) -> ConnectionManager<FlakyConnector> {
        let connector = FlakyConnector {
            failures,
            attempts: AtomicU32::new(0),
            session: RecordingSession::default(),
        };
        let mqtt = MqttConfig {
            max_connect_attempts: max_attempts,
            ..MqttConfig::default()
        };
        ConnectionManager::new(connector, TopicBuilder::default(), &mqtt)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_first_try() {
        let mut manager = manager(0, None);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let (session, _inbound) = manager.connect().await.unwrap();

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.session().is_some());
        assert_eq!(
            *session.calls.lock().unwrap(),
            vec![
                Call::Subscribe("actuators/i2c/#".to_string()),
                Call::Publish("system/bridge/status".to_string(), b"online".to_vec(), true),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let mut manager = manager(10, Some(3));
        let start = tokio::time::Instant::now();

        let result = manager.connect().await;

        assert!(matches!(
            result,
            Err(BridgeError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(manager.connector.attempts.load(Ordering::SeqCst), 3);
        // Two sleeps between three attempts, none after the last
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(6), "elapsed {:?}", elapsed);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_failure_is_retried() {
        let mut manager = manager(0, Some(2));
        manager.connector.session.fail_subscribe = true;

        let result = manager.connect().await;

        assert!(matches!(result, Err(BridgeError::RetriesExhausted { .. })));
        let calls = manager.connector.session.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                Call::Subscribe("actuators/i2c/#".to_string()),
                Call::Disconnect,
                Call::Subscribe("actuators/i2c/#".to_string()),
                Call::Disconnect,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions_are_observable() {
        let mut manager = manager(1, None);
        let mut states = manager.watch_state();

        let watcher = tokio::spawn(async move {
            let mut seen = vec![*states.borrow_and_update()];
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                seen.push(state);
                if state == ConnectionState::Connected {
                    break;
                }
            }
            seen
        });

        manager.connect().await.unwrap();
        let seen = watcher.await.unwrap();

        assert_eq!(seen.first(), Some(&ConnectionState::Disconnected));
        assert_eq!(seen.last(), Some(&ConnectionState::Connected));
    }

    #[tokio::test]
    async fn test_shutdown_without_session() {
        let mut manager = manager(0, None);
        manager.shutdown(None).await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.connector.session.calls.lock().unwrap().is_empty());
    }
}
