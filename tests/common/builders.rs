//! Test data builders

use chrono::{DateTime, TimeZone, Utc};
use serialscope_rs::config::{RemoteConfig, StorageConfig};
use serialscope_rs::{DataPoint, QueryRange, StorageEngine};

/// UTC instant from whole seconds
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

/// Range covering `[start, end]` seconds
pub fn range(start: i64, end: i64) -> QueryRange {
    QueryRange::new(at(start), at(end))
}

/// Simple single-field reading with a room tag
pub fn reading(measurement: &str, secs: i64, value: f64) -> DataPoint {
    DataPoint::new(measurement)
        .with_tag("room", "lab")
        .with_field("value", value)
        .with_timestamp(at(secs))
}

/// Engine over a local store rooted at `dir`
pub fn local_engine(dir: &std::path::Path) -> StorageEngine {
    StorageEngine::from_config(StorageConfig::local(dir)).expect("local engine")
}

/// Remote settings pointing at `url` with a short deadline
pub fn remote_config(url: &str, timeout_ms: u64) -> RemoteConfig {
    RemoteConfig {
        url: url.to_string(),
        token: "test-token".to_string(),
        org: "test-org".to_string(),
        bucket: "test-bucket".to_string(),
        timeout_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_builder() {
        let point = reading("temp", 10, 1.5);
        assert_eq!(point.measurement, "temp");
        assert_eq!(point.timestamp, Some(at(10)));
        assert!(range(0, 10).contains(at(10)));
    }
}
