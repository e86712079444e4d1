//! Serial port access
//!
//! This module owns the single serial connection exposed to the UI.
//!
//! # Components
//!
//! - [`PortManager`] - Open/replace/close lifecycle, synchronous writes, background read loop
//! - [`SerialTransport`] / [`PortOpener`] - Device abstraction used by the manager
//! - [`NativePortOpener`] - Real devices via the `serialport` crate
//! - [`MockPortOpener`] / [`MockLine`] - In-memory devices for testing (feature-gated)
//!
//! # Example
//!
//! ```ignore
//! use serialscope_rs::config::SerialConfig;
//! use serialscope_rs::serial::{NativePortOpener, PortManager};
//! use serialscope_rs::sink::{ChannelSink, SinkId};
//! use std::sync::Arc;
//!
//! let (sink, events) = ChannelSink::new();
//! let manager = PortManager::new(SerialConfig::default(), Box::new(NativePortOpener), Arc::new(sink));
//!
//! manager.init_port("/dev/ttyUSB0", 115_200)?;
//! manager.start_read_loop(SinkId::parse("onData")?)?;
//! manager.write_port(b"PING\n")?;
//!
//! for message in events.iter() {
//!     println!("{:?}", message.event);
//! }
//! ```

pub mod manager;
#[cfg(any(test, feature = "mock-serial"))]
pub mod mock_port;
pub mod transport;

pub use manager::{CancelToken, PortHandle, PortManager};
#[cfg(any(test, feature = "mock-serial"))]
pub use mock_port::{MockLine, MockPortOpener};
pub use transport::{NativePortOpener, PortOpener, SerialTransport};
