//! rumqttc transport for the connection manager.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use i2c_mqtt_common::{BridgeStatus, MqttConfig, TopicBuilder};
use rumqttc::{
    AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, Publish, QoS,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::{InboundMessage, MqttConnector, MqttSession};
use crate::error::{BridgeError, Result};

/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 32;

/// Capacity of the inbound actuator message queue.
const INBOUND_CAPACITY: usize = 64;

/// How long a disconnect may spend flushing queued packets.
const DISCONNECT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Connector that opens sessions with rumqttc.
#[derive(Debug, Clone)]
pub struct RumqttConnector {
    mqtt: MqttConfig,
    topics: TopicBuilder,
}

impl RumqttConnector {
    pub fn new(mqtt: MqttConfig, topics: TopicBuilder) -> Self {
        Self { mqtt, topics }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.mqtt.client_id, &self.mqtt.host, self.mqtt.port);
        options.set_keep_alive(self.mqtt.keep_alive());
        options.set_clean_session(true);
        options.set_last_will(LastWill::new(
            self.topics.status_topic(),
            BridgeStatus::Offline.payload(),
            QoS::AtLeastOnce,
            true,
        ));
        options
    }
}

impl MqttConnector for RumqttConnector {
    type Session = RumqttSession;

    async fn connect(&self) -> Result<(RumqttSession, mpsc::Receiver<InboundMessage>)> {
        info!(host = %self.mqtt.host, port = self.mqtt.port, "Connecting to MQTT broker");

        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);

        // Nothing is sent until the event loop is polled; wait for the ConnAck.
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    debug!(code = ?ack.code, "MQTT ConnAck");
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(BridgeError::connection(e.to_string())),
            }
        }

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let task = tokio::spawn(drive_event_loop(
            eventloop,
            client.clone(),
            self.topics.clone(),
            self.mqtt.retry_delay(),
            tx,
        ));

        let session = RumqttSession {
            client,
            event_task: Arc::new(Mutex::new(Some(task))),
        };
        Ok((session, rx))
    }
}

/// Poll the event loop for the lifetime of the session.
///
/// Forwards inbound publishes, and after a reconnect restores the actuator
/// subscription and the online status. Ends once the outgoing DISCONNECT has
/// been written.
async fn drive_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: TopicBuilder,
    retry_delay: Duration,
    inbound: mpsc::Sender<InboundMessage>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if inbound.send(inbound_message(&publish)).await.is_err() {
                    debug!(topic = %publish.topic, "Actuator receiver closed, dropping message");
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Reconnected to MQTT");
                // The event loop drains the request queue itself, so only the
                // non-blocking client calls are safe here.
                if let Err(e) = client.try_subscribe(topics.actuator_filter(), QoS::AtLeastOnce) {
                    warn!(error = %e, "Failed to restore actuator subscription");
                }
                if let Err(e) = client.try_publish(
                    topics.status_topic(),
                    QoS::AtLeastOnce,
                    true,
                    BridgeStatus::Online.payload(),
                ) {
                    warn!(error = %e, "Failed to republish online status");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, retry_in = ?retry_delay, "MQTT connection lost");
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
}

fn inbound_message(publish: &Publish) -> InboundMessage {
    InboundMessage::new(publish.topic.clone(), publish.payload.to_vec())
}

/// A live rumqttc session.
#[derive(Debug, Clone)]
pub struct RumqttSession {
    client: AsyncClient,
    event_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MqttSession for RumqttSession {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| BridgeError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn subscribe(&self, filter: &str) -> Result<()> {
        self.client
            .subscribe(filter, QoS::AtLeastOnce)
            .await
            .map_err(|e| BridgeError::Subscribe {
                filter: filter.to_string(),
                message: e.to_string(),
            })
    }

    async fn disconnect(&self) -> Result<()> {
        let queued = self.client.disconnect().await;

        let task = self
            .event_task
            .lock()
            .map(|mut guard| guard.take())
            .unwrap_or_default();

        if let Some(mut task) = task {
            if queued.is_err() {
                task.abort();
            } else if tokio::time::timeout(DISCONNECT_DRAIN_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                warn!("Timed out flushing MQTT session, dropping connection");
                task.abort();
            }
        }

        queued.map_err(|e| BridgeError::connection(e.to_string()))
    }
}
