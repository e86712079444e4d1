//! # SerialScope-RS: native bridge for a serial data logger UI
//!
//! Exposes a serial connection, a data point store and basic file access to
//! a UI running across a process boundary. The UI calls named commands with
//! JSON arguments; serial data flows back asynchronously as structured
//! events addressed to a named sink.
//!
//! ## Architecture
//!
//! - **Serial**: [`PortManager`] owns at most one open port and one background
//!   read loop, stopped through a per-handle cancel token
//! - **Sink**: serial events are delivered as typed [`SerialEvent`]s, never as
//!   raw text spliced into a script
//! - **Storage**: [`StorageEngine`] over a local per-record file store or a
//!   remote InfluxDB 2.x compatible service
//! - **Bridge**: [`CommandRouter`] decodes boundary arguments and dispatches
//! - **Host**: [`StdioHost`] serves the router over JSON lines
//!
//! ## Configuration
//!
//! Settings are read from `config.toml` in the platform data directory under
//! `dev.serialscope.serialscope-rs` (or from the path in `SERIALSCOPE_CONFIG`):
//!
//! - **Linux**: `~/.local/share/dev.serialscope.serialscope-rs/`
//! - **macOS**: `~/Library/Application Support/dev.serialscope.serialscope-rs/`
//! - **Windows**: `%APPDATA%\dev.serialscope.serialscope-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use serialscope_rs::{
//!     AppConfig, ChannelSink, CommandRouter, NativePortOpener, PortManager, StorageEngine,
//! };
//! use std::sync::Arc;
//!
//! let config = AppConfig::load_or_default();
//! let (sink, events) = ChannelSink::new();
//! let ports = PortManager::new(config.serial, Box::new(NativePortOpener), Arc::new(sink));
//! let storage = StorageEngine::from_config(config.storage)?;
//! let router = CommandRouter::new(Arc::new(ports), Arc::new(storage));
//!
//! router.dispatch("initSerial", &["/dev/ttyUSB0".into(), 115200.into()])?;
//! router.dispatch("readSerial", &["onData".into()])?;
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod host;
pub mod serial;
pub mod sink;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use bridge::CommandRouter;
pub use config::AppConfig;
pub use error::{BridgeError, Result};
pub use host::StdioHost;
pub use serial::{NativePortOpener, PortHandle, PortManager};
pub use sink::{ChannelSink, EventSink, SerialEvent, SinkId};
pub use storage::{StorageBackend, StorageEngine};
pub use types::{DataPoint, FieldValue, QueryRange};
