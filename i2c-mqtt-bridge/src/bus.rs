//! I2C bus access.
//!
//! [`BusAdapter`] performs single-byte reads and writes against any
//! [`embedded_hal::i2c::I2c`] implementation. A [`BusWorker`] owns the adapter
//! on a dedicated thread so that the poll loop and the actuator handler never
//! touch the bus handle concurrently; both talk to it through a cloneable
//! [`BusHandle`].

use std::thread::JoinHandle;

use embedded_hal::i2c::{ErrorKind, I2c};
use i2c_mqtt_common::{DeviceAddress, mask_value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Depth of the request queue in front of the bus worker.
const REQUEST_QUEUE_DEPTH: usize = 64;

/// Errors from bus I/O.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusError {
    #[error("I2C read from {address} failed: {message}")]
    Read {
        address: DeviceAddress,
        kind: ErrorKind,
        message: String,
    },
    #[error("I2C write to {address} failed: {message}")]
    Write {
        address: DeviceAddress,
        kind: ErrorKind,
        message: String,
    },
    #[error("Failed to open I2C bus {path}: {message}")]
    Open { path: String, message: String },
    #[error("I2C bus worker has stopped")]
    WorkerStopped,
}

fn describe<E: embedded_hal::i2c::Error>(err: &E) -> (ErrorKind, String) {
    let kind = err.kind();
    (kind, format!("{} ({:?})", kind, err))
}

/// Register-level access to the devices on one bus.
#[derive(Debug)]
pub struct BusAdapter<B> {
    bus: B,
}

impl<B: I2c> BusAdapter<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Read a single byte from a device.
    pub fn read(&mut self, address: DeviceAddress) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        match self.bus.read(address.get(), &mut buf) {
            Ok(()) => Ok(buf[0]),
            Err(e) => {
                let (kind, message) = describe(&e);
                debug!(%address, error = %message, "I2C read failed");
                Err(BusError::Read {
                    address,
                    kind,
                    message,
                })
            }
        }
    }

    /// Write a single byte to a device, masking `raw` into `0..=255` first.
    ///
    /// Returns the byte actually written.
    pub fn write(&mut self, address: DeviceAddress, raw: i64) -> Result<u8, BusError> {
        let value = mask_value(raw);
        match self.bus.write(address.get(), &[value]) {
            Ok(()) => {
                info!(%address, value, "I2C write");
                Ok(value)
            }
            Err(e) => {
                let (kind, message) = describe(&e);
                warn!(%address, value, error = %message, "I2C write failed");
                Err(BusError::Write {
                    address,
                    kind,
                    message,
                })
            }
        }
    }

    /// Release the bus. Never fails; the underlying handle is closed on drop.
    pub fn close(self) {
        drop(self.bus);
        debug!("I2C bus closed");
    }
}

/// Open `/dev/i2c-<bus_id>` through the Linux i2c-dev interface.
#[cfg(target_os = "linux")]
pub fn open_linux_bus(path: &str) -> Result<BusAdapter<linux_embedded_hal::I2cdev>, BusError> {
    let bus = linux_embedded_hal::I2cdev::new(path).map_err(|e| BusError::Open {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    info!(path, "Opened I2C bus");
    Ok(BusAdapter::new(bus))
}

enum BusRequest {
    Read {
        address: DeviceAddress,
        reply: oneshot::Sender<Result<u8, BusError>>,
    },
    Write {
        address: DeviceAddress,
        raw: i64,
        reply: oneshot::Sender<Result<u8, BusError>>,
    },
    Close,
}

/// Cloneable async front-end to the bus worker.
#[derive(Debug, Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<BusRequest>,
}

impl std::fmt::Debug for BusRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusRequest::Read { address, .. } => write!(f, "Read({})", address),
            BusRequest::Write { address, raw, .. } => write!(f, "Write({}, {})", address, raw),
            BusRequest::Close => f.write_str("Close"),
        }
    }
}

impl BusHandle {
    /// Read a single byte from a device.
    pub async fn read(&self, address: DeviceAddress) -> Result<u8, BusError> {
        let (reply, rx) = oneshot::channel();
        self.request(BusRequest::Read { address, reply }, rx).await
    }

    /// Write `raw & 0xFF` to a device. Returns the byte written.
    pub async fn write(&self, address: DeviceAddress, raw: i64) -> Result<u8, BusError> {
        let (reply, rx) = oneshot::channel();
        self.request(BusRequest::Write { address, raw, reply }, rx).await
    }

    async fn request(
        &self,
        request: BusRequest,
        rx: oneshot::Receiver<Result<u8, BusError>>,
    ) -> Result<u8, BusError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| BusError::WorkerStopped)?;
        rx.await.map_err(|_| BusError::WorkerStopped)?
    }
}

/// Single owner of the bus adapter, serving requests on its own thread.
pub struct BusWorker {
    handle: BusHandle,
    thread: Option<JoinHandle<()>>,
}

impl BusWorker {
    /// Move the adapter onto a dedicated thread and start serving requests.
    pub fn spawn<B>(adapter: BusAdapter<B>) -> std::io::Result<Self>
    where
        B: I2c + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let thread = std::thread::Builder::new()
            .name("i2c-bus".to_string())
            .spawn(move || serve(adapter, rx))?;

        Ok(Self {
            handle: BusHandle { tx },
            thread: Some(thread),
        })
    }

    /// Get a handle for issuing bus requests.
    pub fn handle(&self) -> BusHandle {
        self.handle.clone()
    }

    /// Stop the worker and close the bus.
    ///
    /// Requests already queued are served first. Failures are logged, never
    /// returned.
    pub async fn shutdown(mut self) {
        if self.handle.tx.send(BusRequest::Close).await.is_err() {
            debug!("I2C bus worker already stopped");
        }

        if let Some(thread) = self.thread.take() {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => warn!("I2C bus worker panicked"),
                Err(e) => warn!(error = %e, "Failed to join I2C bus worker"),
            }
        }
    }
}

fn serve<B: I2c>(mut adapter: BusAdapter<B>, mut rx: mpsc::Receiver<BusRequest>) {
    debug!("I2C bus worker started");

    while let Some(request) = rx.blocking_recv() {
        match request {
            BusRequest::Read { address, reply } => {
                let _ = reply.send(adapter.read(address));
            }
            BusRequest::Write {
                address,
                raw,
                reply,
            } => {
                let _ = reply.send(adapter.write(address, raw));
            }
            BusRequest::Close => break,
        }
    }

    adapter.close();
}
