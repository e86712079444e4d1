//! Configuration sections handed to individual components
//!
//! Each component receives its own section by value when it is built and
//! never sees later edits; changing a section means rebuilding the
//! component.
//!
//! # Main Types
//!
//! - [`StorageConfig`] - Backend selection plus local and remote store settings
//! - [`RemoteConfig`] - Remote time-series store coordinates and deadline
//! - [`SerialConfig`] - Read loop chunk size and poll timeout
//! - [`LoggingConfig`] - Log sink options for the binary

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default directory of the local record store
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default remote store endpoint
pub const DEFAULT_REMOTE_URL: &str = "http://localhost:8086";

/// Default remote organization
pub const DEFAULT_REMOTE_ORG: &str = "myorg";

/// Default remote bucket
pub const DEFAULT_REMOTE_BUCKET: &str = "mybucket";

/// Default deadline for a single remote call in milliseconds
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;

/// Bytes requested from the serial port per read
pub const DEFAULT_READ_CHUNK_SIZE: usize = 128;

/// How long a single serial read may block before the loop re-checks for cancellation
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 50;

/// Which storage backend the engine is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One JSON file per data point in a local directory
    #[default]
    Local,
    /// InfluxDB v2 compatible time-series service
    Remote,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Remote => write!(f, "remote"),
        }
    }
}

/// Storage engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Selected backend
    pub backend: BackendKind,
    /// Directory of the local record store (created on first write)
    pub data_dir: PathBuf,
    /// Remote store settings, used when `backend = "remote"`
    pub remote: RemoteConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            remote: RemoteConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Local store configuration rooted at `data_dir`
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Local,
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Remote store configuration
    pub fn remote(remote: RemoteConfig) -> Self {
        Self {
            backend: BackendKind::Remote,
            remote,
            ..Default::default()
        }
    }
}

/// Remote time-series store coordinates
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the service, e.g. `http://localhost:8086`
    pub url: String,
    /// API token sent as `Authorization: Token <token>`
    pub token: String,
    /// Organization name
    pub org: String,
    /// Bucket name
    pub bucket: String,
    /// Deadline for each remote call in milliseconds
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REMOTE_URL.to_string(),
            token: String::new(),
            org: DEFAULT_REMOTE_ORG.to_string(),
            bucket: DEFAULT_REMOTE_BUCKET.to_string(),
            timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

// Keep the token out of logs.
impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("token", &if self.token.is_empty() { "" } else { "<redacted>" })
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Serial read loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Bytes requested per read
    pub read_chunk_size: usize,
    /// Read timeout in milliseconds; bounds how quickly a stop request is observed
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}

/// Logging options for the binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write a daily rolling log file under the app data directory
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file_logging: true }
    }
}
