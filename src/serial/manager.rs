//! Port lifecycle manager
//!
//! [`PortManager`] owns at most one open serial connection. Opening a new
//! port closes the previous one; writes go synchronously to the current
//! handle; a background thread reads fixed-size chunks and forwards them to
//! an [`EventSink`].
//!
//! # Lifecycle
//!
//! ```text
//! Closed --init_port--> Open(handle #1) --init_port--> Open(handle #2) --close_port/drop--> Closed
//! ```
//!
//! Each handle carries its own [`CancelToken`]. Replacing or closing a handle
//! cancels its token, waits for its read loop to exit and only then releases
//! the device, so a loop never reads from a handle that has been replaced.
//! Loops are joined with the manager lock released, so a sink may call back
//! into the manager from any event, the terminal one included.
//!
//! # Read loop
//!
//! The loop checks the token before every read. Reads block for at most the
//! configured read timeout, which bounds how long cancellation takes to be
//! observed. Every non-empty read becomes exactly one
//! [`SerialEvent::Data`], delivered on the loop thread in read order. The
//! loop always ends with one terminal [`SerialEvent::Closed`] event.

use super::transport::{PortOpener, SerialTransport};
use crate::config::SerialConfig;
use crate::error::{BridgeError, Result, ResultExt};
use crate::sink::{EventSink, SerialEvent, SinkId};
use serde::Serialize;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// Stop signal bound to one port handle
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Description of an open port handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortHandle {
    /// Monotonic id, unique per successful open
    pub id: u64,
    /// Device name as passed to `init_port`
    pub name: String,
    /// Baud rate
    pub baud_rate: u32,
}

/// Running read loop attached to a handle
struct ReadLoop {
    sink: SinkId,
    thread: JoinHandle<()>,
    finished: Arc<AtomicBool>,
}

impl ReadLoop {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn join(self) {
        // A sink that re-enters the manager from the loop thread must not join itself.
        if self.thread.thread().id() == std::thread::current().id() {
            return;
        }
        if self.thread.join().is_err() {
            tracing::error!("Serial read loop for sink {} panicked", self.sink);
        }
    }
}

/// The currently open port
struct OpenPort {
    handle: PortHandle,
    transport: Box<dyn SerialTransport>,
    cancel: CancelToken,
    reader: Option<ReadLoop>,
}

impl OpenPort {
    /// Stop the read loop and release the device
    fn close(mut self) {
        self.cancel.cancel();
        if let Some(reader) = self.reader.take() {
            reader.join();
        }
        tracing::info!(
            "Closed serial port {} (handle #{})",
            self.handle.name,
            self.handle.id
        );
        // `transport` drops here, after the loop released its clone
    }
}

/// Owner of the single serial connection
pub struct PortManager {
    config: SerialConfig,
    opener: Box<dyn PortOpener>,
    sink: Arc<dyn EventSink>,
    port: Mutex<Option<OpenPort>>,
    next_id: AtomicU64,
}

impl PortManager {
    /// Create a manager in the `Closed` state
    pub fn new(
        config: SerialConfig,
        opener: Box<dyn PortOpener>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            opener,
            sink,
            port: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<OpenPort>> {
        self.port.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open `name` at `baud_rate`, closing any previously open handle first
    ///
    /// On failure the manager is left `Closed`: the old handle is released
    /// before the new open is attempted.
    pub fn init_port(&self, name: &str, baud_rate: u32) -> Result<PortHandle> {
        if name.trim().is_empty() {
            return Err(BridgeError::PortOpen {
                port: name.to_string(),
                message: "device name is empty".to_string(),
            });
        }
        if baud_rate == 0 {
            return Err(BridgeError::PortOpen {
                port: name.to_string(),
                message: "baud rate must be positive".to_string(),
            });
        }

        // The old loop may call back into the manager while it winds down,
        // so it is joined with the lock released.
        let mut slot = loop {
            let mut slot = self.lock();
            let Some(previous) = slot.take() else {
                break slot;
            };
            drop(slot);
            tracing::debug!(
                "Replacing serial port {} (handle #{})",
                previous.handle.name,
                previous.handle.id
            );
            previous.close();
        };

        let transport = self
            .opener
            .open(name, baud_rate, self.config.read_timeout())?;

        let handle = PortHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            baud_rate,
        };
        tracing::info!(
            "Serial port {} open at {} baud (handle #{})",
            name,
            baud_rate,
            handle.id
        );

        *slot = Some(OpenPort {
            handle: handle.clone(),
            transport,
            cancel: CancelToken::new(),
            reader: None,
        });
        Ok(handle)
    }

    /// Write `data` to the open port
    pub fn write_port(&self, data: &[u8]) -> Result<()> {
        let mut slot = self.lock();
        let port = slot.as_mut().ok_or(BridgeError::PortNotInitialized)?;
        port.transport
            .write_all(data)
            .map_err(|e| BridgeError::PortWrite(e.to_string()))?;
        tracing::debug!("Wrote {} bytes to {}", data.len(), port.handle.name);
        Ok(())
    }

    /// Start the background read loop for the open handle
    ///
    /// Returns `Ok(false)` without doing anything when no port is open or a
    /// loop is already running for the current handle.
    pub fn start_read_loop(&self, sink: SinkId) -> Result<bool> {
        loop {
            let mut slot = self.lock();
            let Some(port) = slot.as_mut() else {
                tracing::debug!("No serial port open, not starting read loop for {}", sink);
                return Ok(false);
            };

            match port.reader.take() {
                Some(existing) if !existing.is_finished() => {
                    tracing::warn!(
                        "Read loop already running on {} for sink {}, ignoring request for {}",
                        port.handle.name,
                        existing.sink,
                        sink
                    );
                    port.reader = Some(existing);
                    return Ok(false);
                }
                Some(ended) => {
                    // Still delivering its terminal event, which may re-enter the manager
                    drop(slot);
                    ended.join();
                }
                None => return self.spawn_reader(port, sink),
            }
        }
    }

    fn spawn_reader(&self, port: &mut OpenPort, sink: SinkId) -> Result<bool> {
        let reader = port
            .transport
            .try_clone()
            .map_err(BridgeError::Io)
            .with_context(|| format!("Failed to open read handle on {}", port.handle.name))?;

        let finished = Arc::new(AtomicBool::new(false));
        let context = LoopContext {
            port_name: port.handle.name.clone(),
            chunk_size: self.config.read_chunk_size.max(1),
            cancel: port.cancel.clone(),
            sink: self.sink.clone(),
            sink_id: sink.clone(),
            finished: finished.clone(),
        };

        let thread = std::thread::Builder::new()
            .name(format!("serial-read-{}", port.handle.id))
            .spawn(move || context.run(reader))
            .map_err(BridgeError::Io)
            .context("Failed to spawn serial read loop")?;

        tracing::info!(
            "Started read loop on {} (handle #{}) for sink {}",
            port.handle.name,
            port.handle.id,
            sink
        );
        port.reader = Some(ReadLoop {
            sink,
            thread,
            finished,
        });
        Ok(true)
    }

    /// Close the open port, if any (`Open -> Closed`)
    pub fn close_port(&self) -> bool {
        let previous = self.lock().take();
        match previous {
            Some(port) => {
                port.close();
                true
            }
            None => false,
        }
    }

    /// The currently open handle
    pub fn current(&self) -> Option<PortHandle> {
        self.lock().as_ref().map(|p| p.handle.clone())
    }

    /// Stop signal of the currently open handle
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.lock().as_ref().map(|p| p.cancel.clone())
    }

    /// Whether a read loop is running for the current handle
    pub fn is_reading(&self) -> bool {
        self.lock()
            .as_ref()
            .and_then(|p| p.reader.as_ref())
            .is_some_and(|r| !r.is_finished())
    }

    /// Names of the serial devices currently present
    pub fn list_ports(&self) -> Result<Vec<String>> {
        self.opener.available_ports()
    }
}

impl Drop for PortManager {
    fn drop(&mut self) {
        let previous = self.lock().take();
        if let Some(port) = previous {
            port.close();
        }
    }
}

/// Everything the read loop thread owns
struct LoopContext {
    port_name: String,
    chunk_size: usize,
    cancel: CancelToken,
    sink: Arc<dyn EventSink>,
    sink_id: SinkId,
    finished: Arc<AtomicBool>,
}

impl LoopContext {
    fn run(self, mut reader: Box<dyn SerialTransport>) {
        let mut buf = vec![0u8; self.chunk_size];

        let terminal = loop {
            if self.cancel.is_cancelled() {
                break SerialEvent::stopped(&self.port_name);
            }

            match reader.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    self.sink
                        .deliver(&self.sink_id, &SerialEvent::data(&self.port_name, &buf[..n]));
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    if self.cancel.is_cancelled() {
                        break SerialEvent::stopped(&self.port_name);
                    }
                    tracing::error!("Error reading from serial port {}: {}", self.port_name, e);
                    break SerialEvent::failed(&self.port_name, e.to_string());
                }
            }
        };

        drop(reader);
        tracing::info!("Read loop on {} ended", self.port_name);
        // Set before delivery so a sink can restart reading from its callback
        self.finished.store(true, Ordering::SeqCst);
        self.sink.deliver(&self.sink_id, &terminal);
    }
}
