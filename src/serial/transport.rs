//! Serial transport traits and the native implementation
//!
//! [`PortManager`](super::PortManager) talks to devices only through these
//! traits, so the lifecycle logic can be exercised against the in-memory
//! transport in [`mock_port`](super::mock_port) as well as real hardware.

use crate::error::{BridgeError, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// An opened serial connection
///
/// Dropping the transport closes it. A transport obtained through
/// [`try_clone`](SerialTransport::try_clone) shares the underlying device; the
/// device is released once every clone is dropped.
pub trait SerialTransport: Send {
    /// Read up to `buf.len()` bytes
    ///
    /// Returns `ErrorKind::TimedOut` when nothing arrived within the read
    /// timeout the transport was opened with.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Write the whole payload and flush it to the device
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Obtain a second handle to the same device (used by the read loop)
    fn try_clone(&self) -> std::io::Result<Box<dyn SerialTransport>>;
}

/// Factory for serial transports
pub trait PortOpener: Send + Sync {
    /// Open `name` at `baud_rate`; reads block at most `read_timeout`
    fn open(
        &self,
        name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialTransport>>;

    /// Names of the serial devices currently present
    fn available_ports(&self) -> Result<Vec<String>>;
}

/// Opens real devices through the `serialport` crate (8N1, no flow control)
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePortOpener;

impl PortOpener for NativePortOpener {
    fn open(
        &self,
        name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialTransport>> {
        let port = serialport::new(name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|e| BridgeError::PortOpen {
                port: name.to_string(),
                message: e.to_string(),
            })?;

        tracing::info!("Opened serial port: {} at {} baud", name, baud_rate);
        Ok(Box::new(NativeTransport { port }))
    }

    fn available_ports(&self) -> Result<Vec<String>> {
        let ports = serialport::available_ports()
            .map_err(|e| BridgeError::Io(std::io::Error::from(e)))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}

/// `serialport` handle behind the transport trait
struct NativeTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport for NativeTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn try_clone(&self) -> std::io::Result<Box<dyn SerialTransport>> {
        let port = self.port.try_clone().map_err(std::io::Error::from)?;
        Ok(Box::new(NativeTransport { port }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device_is_port_open_error() {
        let err = NativePortOpener
            .open(
                "/dev/serialscope-does-not-exist",
                9600,
                Duration::from_millis(10),
            )
            .err()
            .expect("opening a missing device must fail");
        match err {
            BridgeError::PortOpen { port, .. } => {
                assert_eq!(port, "/dev/serialscope-does-not-exist")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
