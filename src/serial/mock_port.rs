//! In-memory serial transport for testing without hardware
//!
//! A [`MockPortOpener`] holds a set of named [`MockLine`]s. Tests keep a
//! clone of each line to play the device side: queue incoming chunks,
//! inspect what the manager wrote, inject read failures and check whether
//! the manager still holds the line open.
//!
//! Every queued chunk is returned by exactly one read (split only when it
//! exceeds the read buffer), which makes read boundaries deterministic.
//!
//! # Enabling
//!
//! Outside of this crate's unit tests the mock is only available with the
//! `mock-serial` feature:
//!
//! ```bash
//! cargo test --features mock-serial
//! ```

use super::transport::{PortOpener, SerialTransport};
use crate::error::{BridgeError, Result};
use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct LineState {
    incoming: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    /// Live transports (manager handle plus read loop clones)
    open_handles: usize,
    /// Times the line has been opened
    open_count: usize,
    /// Next read fails with this kind
    read_failure: Option<ErrorKind>,
}

/// Device side of a mock serial connection
#[derive(Debug, Clone, Default)]
pub struct MockLine {
    shared: Arc<(Mutex<LineState>, Condvar)>,
}

impl MockLine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LineState> {
        self.shared.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a chunk the host will receive in a single read
    ///
    /// Returns `false` (and drops the chunk) when no host holds the line open.
    pub fn push_incoming(&self, chunk: &[u8]) -> bool {
        let mut state = self.state();
        if state.open_handles == 0 {
            return false;
        }
        state.incoming.push_back(chunk.to_vec());
        self.shared.1.notify_all();
        true
    }

    /// Make the next read fail with `kind`
    pub fn fail_next_read(&self, kind: ErrorKind) {
        self.state().read_failure = Some(kind);
        self.shared.1.notify_all();
    }

    /// Chunks queued but not yet read
    pub fn pending(&self) -> usize {
        self.state().incoming.len()
    }

    /// Everything the host has written so far
    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    /// True while at least one host transport is alive
    pub fn is_open(&self) -> bool {
        self.state().open_handles > 0
    }

    /// Number of times this line has been opened
    pub fn open_count(&self) -> usize {
        self.state().open_count
    }

    /// Block until the line is closed or `timeout` expires
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        while state.open_handles > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .1
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        true
    }

    fn attach(&self, first_open: bool) -> MockTransport {
        let mut state = self.state();
        state.open_handles += 1;
        if first_open {
            state.open_count += 1;
        }
        MockTransport {
            line: self.clone(),
            read_timeout: Duration::ZERO,
        }
    }
}

/// Host side of a mock line
struct MockTransport {
    line: MockLine,
    read_timeout: Duration,
}

impl SerialTransport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let deadline = Instant::now() + self.read_timeout;
        let (lock, cvar) = &*self.line.shared;
        let mut state = lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(kind) = state.read_failure.take() {
                return Err(std::io::Error::new(kind, "mock read failure"));
            }
            if let Some(mut chunk) = state.incoming.pop_front() {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    state.incoming.push_front(chunk.split_off(n));
                }
                return Ok(n);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(std::io::Error::new(ErrorKind::TimedOut, "mock read timed out"));
            }
            state = cvar
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.line.state().written.extend_from_slice(data);
        Ok(())
    }

    fn try_clone(&self) -> std::io::Result<Box<dyn SerialTransport>> {
        let mut clone = self.line.attach(false);
        clone.read_timeout = self.read_timeout;
        Ok(Box::new(clone))
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        let mut state = self.line.state();
        state.open_handles = state.open_handles.saturating_sub(1);
        self.line.shared.1.notify_all();
    }
}

/// Opener serving registered [`MockLine`]s by device name
#[derive(Debug, Default)]
pub struct MockPortOpener {
    lines: Mutex<HashMap<String, MockLine>>,
}

impl MockPortOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device and return its line
    pub fn add_device(&self, name: &str) -> MockLine {
        let line = MockLine::new();
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), line.clone());
        line
    }

    /// Builder-style registration
    pub fn with_device(self, name: &str) -> Self {
        self.add_device(name);
        self
    }

    /// Line registered under `name`
    pub fn line(&self, name: &str) -> Option<MockLine> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }
}

impl PortOpener for MockPortOpener {
    fn open(
        &self,
        name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialTransport>> {
        let line = self.line(name).ok_or_else(|| BridgeError::PortOpen {
            port: name.to_string(),
            message: "No such device".to_string(),
        })?;
        if line.is_open() {
            return Err(BridgeError::PortOpen {
                port: name.to_string(),
                message: "Device or resource busy".to_string(),
            });
        }
        tracing::debug!("Opened mock serial port: {} at {} baud", name, baud_rate);
        let mut transport = line.attach(true);
        transport.read_timeout = read_timeout;
        Ok(Box::new(transport))
    }

    fn available_ports(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}
