//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod fake_influx;
pub mod mock_helpers;

use crossbeam_channel::Receiver;
use serialscope_rs::sink::SinkMessage;
use std::time::Duration;

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Next event from a channel sink, failing the test if none arrives
pub fn next_event(events: &Receiver<SinkMessage>) -> SinkMessage {
    events
        .recv_timeout(test_timeout())
        .expect("no sink event within timeout")
}

/// Assert no further event arrives within a short grace period
pub fn assert_no_event(events: &Receiver<SinkMessage>) {
    if let Ok(message) = events.recv_timeout(Duration::from_millis(100)) {
        panic!("unexpected sink event: {:?}", message);
    }
}
