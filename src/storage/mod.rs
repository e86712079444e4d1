//! Data point persistence
//!
//! [`StorageEngine`] is the single entry point for saving and querying
//! measurements. It owns exactly one [`StorageBackend`], chosen when the
//! engine is built from its [`StorageConfig`]:
//!
//! - [`LocalRecordStore`] - one JSON file per point in a data directory
//! - [`RemoteTimeSeriesStore`] - an InfluxDB 2.x compatible HTTP service
//!
//! The engine validates points and stamps missing timestamps before they
//! reach the backend, and returns query results in timestamp order.

pub mod local;
pub mod remote;

pub use local::LocalRecordStore;
pub use remote::RemoteTimeSeriesStore;

use crate::config::{BackendKind, StorageConfig};
use crate::error::{BridgeError, Result};
use crate::types::{DataPoint, QueryRange};
use chrono::Utc;

/// A place data points can be written to and read back from
pub trait StorageBackend: Send + Sync {
    /// Which kind of backend this is
    fn kind(&self) -> BackendKind;

    /// Store one point
    ///
    /// The engine always passes a validated point with a timestamp set.
    fn persist(&self, point: &DataPoint) -> Result<()>;

    /// All points of `measurement` whose timestamp lies within `range`
    fn query(&self, measurement: &str, range: &QueryRange) -> Result<Vec<DataPoint>>;
}

/// Facade over the configured backend
pub struct StorageEngine {
    config: StorageConfig,
    backend: Box<dyn StorageBackend>,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("backend", &self.backend.kind())
            .field("config", &self.config)
            .finish()
    }
}

impl StorageEngine {
    /// Build the backend selected by `config`
    ///
    /// For the remote backend the service health is probed once and logged;
    /// an unreachable service is not an error here.
    pub fn from_config(config: StorageConfig) -> Result<Self> {
        let backend: Box<dyn StorageBackend> = match config.backend {
            BackendKind::Local => {
                tracing::info!("Using local record store at {:?}", config.data_dir);
                Box::new(LocalRecordStore::new(config.data_dir.clone()))
            }
            BackendKind::Remote => {
                let store = RemoteTimeSeriesStore::new(config.remote.clone())?;
                match store.health() {
                    Ok(status) => tracing::info!(
                        "Using remote store at {} (health: {})",
                        config.remote.url,
                        status
                    ),
                    Err(e) => tracing::warn!(
                        "Remote store at {} is not healthy: {}",
                        config.remote.url,
                        e
                    ),
                }
                Box::new(store)
            }
        };
        Ok(Self { config, backend })
    }

    /// Build an engine around an already constructed backend
    pub fn with_backend(config: StorageConfig, backend: Box<dyn StorageBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Validate, timestamp and store a point; returns the point as stored
    pub fn persist(&self, point: DataPoint) -> Result<DataPoint> {
        point.validate().map_err(BridgeError::InvalidDataPoint)?;
        let point = point.stamped(Utc::now());
        self.backend.persist(&point)?;
        tracing::debug!(
            "Saved {} ({} fields) to {} store",
            point.measurement,
            point.fields.len(),
            self.backend.kind()
        );
        Ok(point)
    }

    /// Points of `measurement` within `range`, oldest first
    pub fn query(&self, measurement: &str, range: &QueryRange) -> Result<Vec<DataPoint>> {
        let mut points = self.backend.query(measurement, range)?;
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }
}
