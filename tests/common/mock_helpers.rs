//! Mock construction helpers

#[cfg(feature = "mock-serial")]
use crossbeam_channel::Receiver;
#[cfg(feature = "mock-serial")]
use serialscope_rs::config::SerialConfig;
#[cfg(feature = "mock-serial")]
use serialscope_rs::serial::{MockLine, MockPortOpener};
#[cfg(feature = "mock-serial")]
use serialscope_rs::sink::SinkMessage;
#[cfg(feature = "mock-serial")]
use serialscope_rs::{ChannelSink, PortManager};
#[cfg(feature = "mock-serial")]
use std::sync::Arc;

/// Serial settings with a short read timeout so loops react quickly
#[cfg(feature = "mock-serial")]
pub fn fast_serial_config() -> SerialConfig {
    SerialConfig {
        read_chunk_size: 128,
        read_timeout_ms: 10,
    }
}

/// Manager over mock devices, its event channel and the device lines
#[cfg(feature = "mock-serial")]
pub fn create_test_manager(devices: &[&str]) -> (PortManager, Receiver<SinkMessage>, Vec<MockLine>) {
    let opener = MockPortOpener::new();
    let lines = devices.iter().map(|name| opener.add_device(name)).collect();
    let (sink, events) = ChannelSink::new();
    let manager = PortManager::new(fast_serial_config(), Box::new(opener), Arc::new(sink));
    (manager, events, lines)
}
