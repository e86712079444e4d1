//! Core data types for serialscope-rs
//!
//! This module contains the measurement data model shared by the storage
//! backends and the command router.
//!
//! # Main Types
//!
//! - [`FieldValue`] - A scalar field value (bool, integer, unsigned, float, string)
//! - [`DataPoint`] - One observation: measurement, tags, fields and timestamp
//! - [`QueryRange`] - An inclusive `[start, end]` time window
//!
//! # Ordering
//!
//! Tags and fields are kept in `BTreeMap`s. The data model treats them as
//! unordered; the sorted maps only make serialized output deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag set of a data point (categorical dimensions)
pub type Tags = BTreeMap<String, String>;

/// Field set of a data point (measured values)
pub type Fields = BTreeMap<String, FieldValue>;

/// A scalar field value
///
/// Serialized untagged so that the persisted JSON carries plain values
/// (`true`, `42`, `3.5`, `"ok"`). Variant order matters for decoding:
/// integral JSON numbers become `Integer` (or `UInteger` above `i64::MAX`)
/// and anything with a fraction or exponent becomes `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Integer(i64),
    UInteger(u64),
    Float(f64),
    String(String),
}

impl FieldValue {
    /// Convert a JSON value into a field value, if it is a scalar
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(FieldValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FieldValue::Integer(i))
                } else if let Some(u) = n.as_u64() {
                    Some(FieldValue::UInteger(u))
                } else {
                    n.as_f64().map(FieldValue::Float)
                }
            }
            serde_json::Value::String(s) => Some(FieldValue::String(s.clone())),
            _ => None,
        }
    }

    /// Convert into a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Integer(i) => serde_json::Value::from(*i),
            FieldValue::UInteger(u) => serde_json::Value::from(*u),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

/// One observation of a measurement
///
/// A point is immutable once built. The timestamp may be left unset by the
/// caller; the storage engine assigns the persist time in that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Measurement name
    pub measurement: String,
    /// Categorical dimensions
    #[serde(default)]
    pub tags: Tags,
    /// Measured values
    #[serde(default)]
    pub fields: Fields,
    /// When the observation was made (RFC 3339 in serialized form)
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl DataPoint {
    /// Create a point with no tags, fields or timestamp
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Tags::new(),
            fields: Fields::new(),
            timestamp: None,
        }
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set an explicit timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Return this point with `now` as timestamp if it carries none
    pub fn stamped(mut self, now: DateTime<Utc>) -> Self {
        if self.timestamp.is_none() {
            self.timestamp = Some(now);
        }
        self
    }

    /// Check the point can be stored by every backend
    ///
    /// The measurement becomes part of a file name in the local store, so it
    /// must not contain path separators or control characters.
    pub fn validate(&self) -> Result<(), String> {
        if self.measurement.trim().is_empty() {
            return Err("measurement name is empty".to_string());
        }
        if self
            .measurement
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
            || self.measurement == "."
            || self.measurement == ".."
        {
            return Err(format!(
                "measurement name '{}' contains reserved characters",
                self.measurement
            ));
        }
        if self.fields.is_empty() {
            return Err("data point has no fields".to_string());
        }
        if self.tags.keys().any(|k| k.is_empty()) {
            return Err("tag keys must not be empty".to_string());
        }
        if self.fields.keys().any(|k| k.is_empty()) {
            return Err("field keys must not be empty".to_string());
        }
        if let Some((key, _)) = self
            .fields
            .iter()
            .find(|(_, v)| matches!(v, FieldValue::Float(f) if !f.is_finite()))
        {
            return Err(format!("field '{}' is not a finite number", key));
        }
        Ok(())
    }

    /// True when measurement, tags and fields match (timestamp ignored)
    pub fn same_content(&self, other: &DataPoint) -> bool {
        self.measurement == other.measurement
            && self.tags == other.tags
            && self.fields == other.fields
    }
}

/// Inclusive time window `[start, end]`
///
/// `start <= end` is not enforced here; callers validate before querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QueryRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Check whether `t` falls inside the window, both ends included
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }

    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}
