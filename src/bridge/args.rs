//! Decoding of loosely typed boundary arguments
//!
//! Every decoder names the argument it was given so that failures read
//! like `Malformed argument 'baudRate': expected a positive integer`.
//! Nothing here substitutes a default for a value that fails to decode.

use crate::error::{BridgeError, Result};
use crate::types::{FieldValue, Fields, QueryRange, Tags};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Positional argument lookup
pub struct Args<'a> {
    command: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub fn new(command: &'a str, values: &'a [Value]) -> Self {
        Self { command, values }
    }

    /// Required argument at `index`
    pub fn required(&self, index: usize, name: &str) -> Result<&'a Value> {
        match self.values.get(index) {
            Some(Value::Null) | None => Err(BridgeError::malformed(
                name,
                format!("missing argument {} for {}", index + 1, self.command),
            )),
            Some(value) => Ok(value),
        }
    }

    /// Optional argument at `index` (absent or `null`)
    pub fn optional(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index).filter(|v| !v.is_null())
    }
}

pub fn string<'v>(value: &'v Value, name: &str) -> Result<&'v str> {
    value
        .as_str()
        .ok_or_else(|| BridgeError::malformed(name, format!("expected a string, got {}", kind(value))))
}

pub fn baud_rate(value: &Value, name: &str) -> Result<u32> {
    value
        .as_u64()
        .filter(|b| *b > 0)
        .and_then(|b| u32::try_from(b).ok())
        .ok_or_else(|| BridgeError::malformed(name, format!("expected a positive integer, got {}", value)))
}

/// A byte payload: UTF-8 text or an array of byte values
pub fn payload(value: &Value, name: &str) -> Result<Vec<u8>> {
    match value {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| {
                        BridgeError::malformed(
                            name,
                            format!("element {} is not a byte value: {}", i, item),
                        )
                    })
            })
            .collect(),
        other => Err(BridgeError::malformed(
            name,
            format!("expected a string or byte array, got {}", kind(other)),
        )),
    }
}

/// Tag set: an object of string values
pub fn tags(value: &Value, name: &str) -> Result<Tags> {
    let object = value
        .as_object()
        .ok_or_else(|| BridgeError::malformed(name, format!("expected an object, got {}", kind(value))))?;
    object
        .iter()
        .map(|(key, v)| match v {
            Value::String(s) => Ok((key.clone(), s.clone())),
            other => Err(BridgeError::malformed(
                name,
                format!("tag '{}' must be a string, got {}", key, kind(other)),
            )),
        })
        .collect()
}

/// Field set: an object of scalar values
pub fn fields(value: &Value, name: &str) -> Result<Fields> {
    let object = value
        .as_object()
        .ok_or_else(|| BridgeError::malformed(name, format!("expected an object, got {}", kind(value))))?;
    object
        .iter()
        .map(|(key, v)| {
            FieldValue::from_json(v)
                .map(|field| (key.clone(), field))
                .ok_or_else(|| {
                    BridgeError::malformed(
                        name,
                        format!("field '{}' must be a bool, number or string, got {}", key, kind(v)),
                    )
                })
        })
        .collect()
}

/// Strict RFC 3339 timestamp (date, time and offset all required)
pub fn timestamp(value: &Value, name: &str) -> Result<DateTime<Utc>> {
    let text = string(value, name)?;
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BridgeError::malformed(name, format!("'{}' is not an RFC 3339 timestamp: {}", text, e)))
}

/// Ordered time window
pub fn range(start: &Value, end: &Value) -> Result<QueryRange> {
    let range = QueryRange::new(timestamp(start, "start")?, timestamp(end, "end")?);
    if !range.is_ordered() {
        return Err(BridgeError::malformed(
            "end",
            format!("end {} is before start {}", range.end, range.start),
        ));
    }
    Ok(range)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
