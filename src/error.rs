//! Error handling for serialscope-rs
//!
//! This module defines the error taxonomy shared by the serial port manager,
//! the storage engine and the command router, plus a Result alias used
//! throughout the crate. Errors cross the UI boundary as their `Display`
//! string, so every message is written to be shown to a user.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for serialscope-rs operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The serial device could not be opened (missing device, permissions, bad baud rate)
    #[error("Failed to open serial port '{port}': {message}")]
    PortOpen { port: String, message: String },

    /// A port operation was requested before any port was opened
    #[error("Serial port not initialized")]
    PortNotInitialized,

    /// Writing to the open serial port failed
    #[error("Serial write error: {0}")]
    PortWrite(String),

    /// File create/write/read failure inside the local record store
    #[error("Local storage error at {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote time-series store rejected or failed a write
    #[error("Remote write error: {0}")]
    RemoteWrite(String),

    /// The remote time-series store rejected or failed a query
    #[error("Remote query error: {0}")]
    RemoteQuery(String),

    /// A remote call exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A boundary argument could not be decoded into the expected type
    #[error("Malformed argument '{argument}': {message}")]
    MalformedArgument { argument: String, message: String },

    /// A data point failed validation before being persisted
    #[error("Invalid data point: {0}")]
    InvalidDataPoint(String),

    /// The boundary asked for a command the router does not know
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BridgeError>,
    },
}

impl BridgeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BridgeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build a `MalformedArgument` error
    pub fn malformed(argument: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::MalformedArgument {
            argument: argument.into(),
            message: message.into(),
        }
    }

    /// Build a `LocalIo` error for the given path
    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BridgeError::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// The innermost error, looking through any context wrappers
    pub fn root(&self) -> &BridgeError {
        match self {
            BridgeError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

/// Result type alias for serialscope-rs operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
