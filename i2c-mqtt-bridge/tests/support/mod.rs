//! In-memory stand-ins for the I2C bus and the MQTT transport.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use i2c_mqtt_bridge::{BridgeError, InboundMessage, MqttConnector, MqttSession, Result};
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct NackError;

impl embedded_hal::i2c::Error for NackError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }
}

/// Shared state of a [`FakeBus`], inspectable after the bus moves to its worker.
#[derive(Debug, Default)]
pub struct BusState {
    pub registers: HashMap<u8, u8>,
    pub failing_reads: HashSet<u8>,
    pub failing_writes: HashSet<u8>,
    pub writes: Vec<(u8, Vec<u8>)>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeBus {
    pub state: Arc<Mutex<BusState>>,
}

impl FakeBus {
    pub fn with_registers(registers: &[(u8, u8)]) -> Self {
        let bus = Self::default();
        bus.state.lock().unwrap().registers = registers.iter().copied().collect();
        bus
    }

    pub fn fail_reads(self, address: u8) -> Self {
        self.state.lock().unwrap().failing_reads.insert(address);
        self
    }

    pub fn fail_writes(self, address: u8) -> Self {
        self.state.lock().unwrap().failing_writes.insert(address);
        self
    }

    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().unwrap().writes.clone()
    }
}

impl ErrorType for FakeBus {
    type Error = NackError;
}

impl I2c for FakeBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> std::result::Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        for op in operations {
            match op {
                Operation::Read(buf) => {
                    if state.failing_reads.contains(&address) {
                        return Err(NackError);
                    }
                    let value = state.registers.get(&address).copied().unwrap_or(0);
                    buf.fill(value);
                }
                Operation::Write(bytes) => {
                    if state.failing_writes.contains(&address) {
                        return Err(NackError);
                    }
                    state.writes.push((address, bytes.to_vec()));
                }
            }
        }
        Ok(())
    }
}

/// One observable transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Publish {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    Subscribe(String),
    Disconnect,
}

impl Call {
    pub fn is_publish_to(&self, wanted: &str) -> bool {
        matches!(self, Call::Publish { topic, .. } if topic == wanted)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeSession {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub failing_topics: Arc<Mutex<HashSet<String>>>,
}

impl FakeSession {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn publishes_to(&self, topic: &str) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Publish {
                    topic: t, payload, ..
                } if t == topic => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn fail_publishes_to(&self, topic: &str) {
        self.failing_topics.lock().unwrap().insert(topic.to_string());
    }
}

impl MqttSession for FakeSession {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        if self.failing_topics.lock().unwrap().contains(topic) {
            return Err(BridgeError::Publish {
                topic: topic.to_string(),
                message: "broker unavailable".to_string(),
            });
        }
        self.calls.lock().unwrap().push(Call::Publish {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Subscribe(filter.to_string()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Disconnect);
        Ok(())
    }
}

/// Connector that refuses the first `failures` attempts.
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    pub failures: u32,
    pub session: FakeSession,
    pub attempts: Arc<Mutex<Vec<Instant>>>,
    pub inbound: Arc<Mutex<Option<mpsc::Sender<InboundMessage>>>>,
}

impl FakeConnector {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    /// Sender feeding the actuator path of the current session.
    pub fn inbound(&self) -> Option<mpsc::Sender<InboundMessage>> {
        self.inbound.lock().unwrap().clone()
    }
}

impl MqttConnector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self) -> Result<(FakeSession, mpsc::Receiver<InboundMessage>)> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(Instant::now());
            attempts.len() as u32
        };

        if attempt <= self.failures {
            return Err(BridgeError::connection("connection refused"));
        }

        let (tx, rx) = mpsc::channel(16);
        *self.inbound.lock().unwrap() = Some(tx);
        Ok((self.session.clone(), rx))
    }
}

/// Wait (in real time) until `condition` holds, failing the test after 5s.
pub async fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            std::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
