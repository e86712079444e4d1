//! Command routing between the UI boundary and the native components
//!
//! The UI calls commands by name with a list of loosely typed JSON
//! arguments. [`CommandRouter::dispatch`] decodes those arguments (see
//! [`args`]), calls into the [`PortManager`] or [`StorageEngine`], and hands
//! back a JSON result. Errors travel back as [`BridgeError`], whose display
//! string is what the UI shows.
//!
//! | Command | Arguments | Result |
//! |---|---|---|
//! | `initSerial` | port name, baud rate | port handle |
//! | `writeSerial` | text or byte array | `null` |
//! | `readSerial` | sink id | `null` (errors are only logged) |
//! | `closeSerial` | | whether a port was open |
//! | `listSerialPorts` | | device names |
//! | `saveDataPoint` | measurement, tags, fields, [timestamp] | stored point |
//! | `queryData` | measurement, start, end | points, oldest first |
//! | `saveFile` | path, content | `null` |
//! | `readFile` | path | content |
//! | `listDirectory` | path | entries |
//! | `getVersionInfo` | | name and version |

pub mod args;
pub mod files;

use crate::error::{BridgeError, Result};
use crate::serial::{PortHandle, PortManager};
use crate::sink::SinkId;
use crate::storage::StorageEngine;
use crate::types::{DataPoint, Fields, QueryRange, Tags};
use args::Args;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

pub use files::DirEntry;

/// Build information reported to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Stateless dispatcher over the port manager and storage engine
#[derive(Clone)]
pub struct CommandRouter {
    ports: Arc<PortManager>,
    storage: Arc<StorageEngine>,
}

impl CommandRouter {
    pub fn new(ports: Arc<PortManager>, storage: Arc<StorageEngine>) -> Self {
        Self { ports, storage }
    }

    /// Run `command` with boundary arguments
    pub fn dispatch(&self, command: &str, values: &[Value]) -> Result<Value> {
        tracing::debug!("Dispatching {} with {} args", command, values.len());
        let input = Args::new(command, values);

        match command {
            "initSerial" => {
                let name = args::string(input.required(0, "portName")?, "portName")?;
                let baud = args::baud_rate(input.required(1, "baudRate")?, "baudRate")?;
                to_value(self.init_serial(name, baud)?)
            }
            "writeSerial" => {
                let data = args::payload(input.required(0, "data")?, "data")?;
                self.write_serial(&data)?;
                Ok(Value::Null)
            }
            "readSerial" => {
                match input
                    .required(0, "sinkId")
                    .and_then(|v| args::string(v, "sinkId"))
                {
                    Ok(sink) => self.read_serial(sink),
                    Err(e) => tracing::error!("readSerial: {}", e),
                }
                Ok(Value::Null)
            }
            "closeSerial" => Ok(Value::Bool(self.close_serial())),
            "listSerialPorts" => to_value(self.list_serial_ports()?),
            "saveDataPoint" => {
                let measurement = args::string(input.required(0, "measurement")?, "measurement")?;
                let tags = args::tags(input.required(1, "tags")?, "tags")?;
                let fields = args::fields(input.required(2, "fields")?, "fields")?;
                let timestamp = input
                    .optional(3)
                    .map(|v| args::timestamp(v, "timestamp"))
                    .transpose()?;
                to_value(self.save_data_point(measurement, tags, fields, timestamp)?)
            }
            "queryData" => {
                let measurement = args::string(input.required(0, "measurement")?, "measurement")?;
                let range = args::range(input.required(1, "start")?, input.required(2, "end")?)?;
                to_value(self.query_data(measurement, &range)?)
            }
            "saveFile" => {
                let path = args::string(input.required(0, "path")?, "path")?;
                let content = args::string(input.required(1, "content")?, "content")?;
                files::save_file(Path::new(path), content)?;
                Ok(Value::Null)
            }
            "readFile" => {
                let path = args::string(input.required(0, "path")?, "path")?;
                Ok(Value::String(files::read_file(Path::new(path))?))
            }
            "listDirectory" => {
                let path = args::string(input.required(0, "path")?, "path")?;
                to_value(files::list_directory(Path::new(path))?)
            }
            "getVersionInfo" => to_value(VersionInfo::current()),
            other => Err(BridgeError::UnknownCommand(other.to_string())),
        }
    }

    pub fn init_serial(&self, name: &str, baud_rate: u32) -> Result<PortHandle> {
        self.ports.init_port(name, baud_rate)
    }

    pub fn write_serial(&self, data: &[u8]) -> Result<()> {
        self.ports.write_port(data)
    }

    /// Start streaming to `sink`; failures are logged, never returned
    pub fn read_serial(&self, sink: &str) {
        let started = SinkId::parse(sink).and_then(|id| self.ports.start_read_loop(id));
        match started {
            Ok(true) => {}
            Ok(false) => tracing::debug!("readSerial for {} did not start a new loop", sink),
            Err(e) => tracing::error!("readSerial for {} failed: {}", sink, e),
        }
    }

    pub fn close_serial(&self) -> bool {
        self.ports.close_port()
    }

    pub fn list_serial_ports(&self) -> Result<Vec<String>> {
        self.ports.list_ports()
    }

    pub fn save_data_point(
        &self,
        measurement: &str,
        tags: Tags,
        fields: Fields,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<DataPoint> {
        let point = DataPoint {
            measurement: measurement.to_string(),
            tags,
            fields,
            timestamp,
        };
        self.storage.persist(point)
    }

    pub fn query_data(&self, measurement: &str, range: &QueryRange) -> Result<Vec<DataPoint>> {
        self.storage.query(measurement, range)
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
