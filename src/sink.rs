//! Delivery of serial events to the UI side
//!
//! The read loop never builds executable text from device bytes. Each chunk
//! becomes a typed [`SerialEvent`] which an [`EventSink`] hands to the
//! boundary:
//!
//! - [`ScriptSink`] - Renders `sinkId(<json>)` for hosts that evaluate script
//!   fragments (webviews). The argument is always a JSON literal produced by
//!   `serde_json`, so device bytes cannot terminate or alter the call.
//! - [`ChannelSink`] - Forwards events over a crossbeam channel to whatever
//!   thread owns the boundary (the stdio host, tests).

use crate::error::{BridgeError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Name of the UI-side callback that receives serial events
///
/// Only dotted identifier paths are accepted (`onData`, `app.serial.onData`).
/// The manager keeps the identifier only; it never checks that the callback
/// exists on the UI side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SinkId(String);

impl SinkId {
    /// Validate and wrap a sink identifier
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(BridgeError::malformed("sinkId", "sink identifier is empty"));
        }
        for segment in raw.split('.') {
            let mut chars = segment.chars();
            let valid_head = chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
            let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
            if !valid_head || !valid_tail {
                return Err(BridgeError::malformed(
                    "sinkId",
                    format!("'{}' is not a valid callback name", raw),
                ));
            }
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    /// The loop was cancelled (port re-initialised, closed, or shut down)
    Stopped,
    /// A read failed; the loop cannot continue on this handle
    Error,
}

/// Event emitted by the serial read loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SerialEvent {
    /// One read's worth of bytes, verbatim
    Data {
        port: String,
        bytes: Vec<u8>,
        /// Lossy UTF-8 rendering of `bytes`, for text protocols
        text: String,
    },
    /// Terminal event: no further events follow for this loop
    Closed {
        port: String,
        reason: CloseReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl SerialEvent {
    pub fn data(port: &str, bytes: &[u8]) -> Self {
        SerialEvent::Data {
            port: port.to_string(),
            bytes: bytes.to_vec(),
            text: String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn stopped(port: &str) -> Self {
        SerialEvent::Closed {
            port: port.to_string(),
            reason: CloseReason::Stopped,
            message: None,
        }
    }

    pub fn failed(port: &str, message: impl Into<String>) -> Self {
        SerialEvent::Closed {
            port: port.to_string(),
            reason: CloseReason::Error,
            message: Some(message.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SerialEvent::Closed { .. })
    }
}

/// Destination for read loop events
///
/// Called from the read loop thread, once per event, in read order.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn deliver(&self, sink: &SinkId, event: &SerialEvent);
}

/// Boundary capability: evaluate a script fragment in the UI
///
/// Implementations must be callable from a background thread and must not
/// block the caller indefinitely.
pub trait ScriptHost: Send + Sync {
    fn eval(&self, script: &str);
}

/// Render the script invocation for an event
///
/// U+2028 and U+2029 are valid inside JSON strings but terminate lines in
/// older script engines, so they are escaped on top of `serde_json` output.
pub fn render_invocation(sink: &SinkId, event: &SerialEvent) -> Result<String> {
    let payload = serde_json::to_string(event)?
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029");
    Ok(format!("{}({})", sink, payload))
}

/// Sink that evaluates `sinkId(<json event>)` through a [`ScriptHost`]
pub struct ScriptSink<H: ScriptHost> {
    host: H,
}

impl<H: ScriptHost> ScriptSink<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }
}

impl<H: ScriptHost> EventSink for ScriptSink<H> {
    fn deliver(&self, sink: &SinkId, event: &SerialEvent) {
        match render_invocation(sink, event) {
            Ok(script) => self.host.eval(&script),
            Err(e) => tracing::error!("Failed to encode serial event for {}: {}", sink, e),
        }
    }
}

/// A routed event, as carried by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkMessage {
    pub sink: SinkId,
    pub event: SerialEvent,
}

/// Sink that forwards events over a channel
#[derive(Clone)]
pub struct ChannelSink {
    sender: Sender<SinkMessage>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn new() -> (Self, Receiver<SinkMessage>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, sink: &SinkId, event: &SerialEvent) {
        let message = SinkMessage {
            sink: sink.clone(),
            event: event.clone(),
        };
        if self.sender.send(message).is_err() {
            tracing::debug!("Sink channel closed, dropping event for {}", sink);
        }
    }
}
