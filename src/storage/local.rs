//! Embedded per-record file store
//!
//! Every data point is one JSON file in a single directory:
//!
//! ```text
//! data/
//!   temperature_1700000000.json
//!   temperature_1700000000-1.json   <- second point in the same second
//!   humidity_1700000003.json
//! ```
//!
//! Files are created with `create_new`, so two writers racing for the same
//! second each get their own file and both points remain retrievable.
//! Queries scan the whole directory; files that cannot be read or decoded
//! are skipped.

use super::StorageBackend;
use crate::config::BackendKind;
use crate::error::{BridgeError, Result};
use crate::types::{DataPoint, Fields, QueryRange, Tags};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Extension of record files
pub const RECORD_EXTENSION: &str = "json";

/// Upper bound on same-second suffixes tried before giving up
const MAX_COLLISION_SUFFIX: u32 = 100_000;

/// On-disk shape of one record
#[derive(Debug, Serialize, Deserialize)]
struct RecordFile {
    measurement: String,
    #[serde(default)]
    tags: Tags,
    #[serde(default)]
    fields: Fields,
    timestamp: DateTime<Utc>,
}

/// Directory-of-records backend
#[derive(Debug, Clone)]
pub struct LocalRecordStore {
    dir: PathBuf,
}

impl LocalRecordStore {
    /// Create a store rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for the `n`th point of `measurement` within second `secs`
    pub fn record_file_name(measurement: &str, secs: i64, n: u32) -> String {
        if n == 0 {
            format!("{}_{}.{}", measurement, secs, RECORD_EXTENSION)
        } else {
            format!("{}_{}-{}.{}", measurement, secs, n, RECORD_EXTENSION)
        }
    }

    /// Write `bytes` to the first free file name for this key
    fn create_record(&self, measurement: &str, secs: i64, bytes: &[u8]) -> Result<PathBuf> {
        for n in 0..MAX_COLLISION_SUFFIX {
            let path = self
                .dir
                .join(Self::record_file_name(measurement, secs, n));
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(BridgeError::local_io(path, e)),
            };

            if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_data()) {
                drop(file);
                // No partial records on disk
                let _ = std::fs::remove_file(&path);
                return Err(BridgeError::local_io(path, e));
            }
            return Ok(path);
        }

        Err(BridgeError::local_io(
            self.dir.join(Self::record_file_name(measurement, secs, 0)),
            std::io::Error::new(
                ErrorKind::AlreadyExists,
                "too many records for this measurement within one second",
            ),
        ))
    }

    fn read_record(path: &Path) -> Option<RecordFile> {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("Skipping unreadable record {:?}: {}", path, e);
                return None;
            }
        };
        match serde_json::from_slice(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("Skipping malformed record {:?}: {}", path, e);
                None
            }
        }
    }
}

impl StorageBackend for LocalRecordStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn persist(&self, point: &DataPoint) -> Result<()> {
        let timestamp = point.timestamp.unwrap_or_else(Utc::now);

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| BridgeError::local_io(self.dir.clone(), e))?;

        let record = RecordFile {
            measurement: point.measurement.clone(),
            tags: point.tags.clone(),
            fields: point.fields.clone(),
            timestamp,
        };
        let bytes = serde_json::to_vec(&record)?;

        let path = self.create_record(&point.measurement, timestamp.timestamp(), &bytes)?;
        tracing::debug!("Persisted {} to {:?}", point.measurement, path);
        Ok(())
    }

    fn query(&self, measurement: &str, range: &QueryRange) -> Result<Vec<DataPoint>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BridgeError::local_io(self.dir.clone(), e)),
        };

        let mut points = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let Some(record) = Self::read_record(&entry.path()) else {
                continue;
            };
            if record.measurement == measurement && range.contains(record.timestamp) {
                points.push(DataPoint {
                    measurement: record.measurement,
                    tags: record.tags,
                    fields: record.fields,
                    timestamp: Some(record.timestamp),
                });
            }
        }

        tracing::debug!(
            "Local query for {} matched {} records",
            measurement,
            points.len()
        );
        Ok(points)
    }
}
