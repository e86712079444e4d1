//! JSON-lines host for running the bridge without a UI toolkit
//!
//! Requests arrive one per line on the input:
//!
//! ```text
//! {"id": 1, "command": "initSerial", "args": ["/dev/ttyUSB0", 115200]}
//! ```
//!
//! and every request gets exactly one response line:
//!
//! ```text
//! {"id": 1, "ok": {"id": 1, "name": "/dev/ttyUSB0", "baudRate": 115200}}
//! {"id": 2, "error": "Serial port not initialized"}
//! ```
//!
//! Serial events are written as they arrive, interleaved with responses:
//!
//! ```text
//! {"sink": "onData", "event": {"type": "data", "port": "/dev/ttyUSB0", "bytes": [52, 50, 10], "text": "42\n"}}
//! ```
//!
//! End of input closes the port, flushes the remaining events and returns.

use crate::bridge::CommandRouter;
use crate::error::Result;
use crate::sink::SinkMessage;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How often the event forwarder checks for shutdown
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    command: String,
    #[serde(default)]
    args: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct Response {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    ok: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Response {
    fn ok(id: Value, value: Value) -> Self {
        Self {
            id,
            ok: Some(value),
            error: None,
        }
    }

    fn error(id: Value, message: String) -> Self {
        Self {
            id,
            ok: None,
            error: Some(message),
        }
    }
}

/// Line-oriented request loop around a [`CommandRouter`]
pub struct StdioHost {
    router: CommandRouter,
    events: Receiver<SinkMessage>,
}

impl StdioHost {
    pub fn new(router: CommandRouter, events: Receiver<SinkMessage>) -> Self {
        Self { router, events }
    }

    /// Handle one request line and build its response line
    pub fn handle_line(&self, line: &str) -> String {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => match self.router.dispatch(&request.command, &request.args) {
                Ok(value) => Response::ok(request.id, value),
                Err(e) => {
                    tracing::warn!("{} failed: {}", request.command, e);
                    Response::error(request.id, e.to_string())
                }
            },
            Err(e) => {
                // Keep the id if the line was JSON at all
                let id = serde_json::from_str::<Value>(line)
                    .ok()
                    .and_then(|v| v.get("id").cloned())
                    .unwrap_or(Value::Null);
                Response::error(id, format!("Malformed request: {}", e))
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(r#"{{"id":null,"error":"Failed to encode response: {}"}}"#, e)
        })
    }

    /// Serve requests from `input` until it ends
    pub fn run<R: BufRead, W: Write + Send>(&self, input: R, output: W) -> Result<()> {
        let output = Mutex::new(output);
        let running = AtomicBool::new(true);

        std::thread::scope(|scope| {
            let forwarder = scope.spawn(|| self.forward_events(&output, &running));

            let served = self.serve(input, &output);

            tracing::info!("Input closed, shutting down host");
            self.router.close_serial();
            running.store(false, Ordering::SeqCst);
            if forwarder.join().is_err() {
                tracing::error!("Event forwarder panicked");
            }
            served
        })
    }

    fn serve<R: BufRead, W: Write>(&self, input: R, output: &Mutex<W>) -> Result<()> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line);
            write_line(output, &response)?;
        }
        Ok(())
    }

    fn forward_events<W: Write>(&self, output: &Mutex<W>, running: &AtomicBool) {
        loop {
            match self.events.recv_timeout(EVENT_POLL_INTERVAL) {
                Ok(message) => {
                    let line = match serde_json::to_string(&message) {
                        Ok(line) => line,
                        Err(e) => {
                            tracing::error!("Failed to encode event for {}: {}", message.sink, e);
                            continue;
                        }
                    };
                    if let Err(e) = write_line(output, &line) {
                        tracing::error!("Failed to write event: {}", e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!("Event forwarder stopped");
    }
}

fn write_line<W: Write>(output: &Mutex<W>, line: &str) -> Result<()> {
    let mut out = output.lock().unwrap_or_else(|e| e.into_inner());
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}
