//! Line protocol encoding for the remote write API
//!
//! ```text
//! measurement,tag1=a,tag2=b field1=1.5,field2=3i,field3="text" 1700000000000000000
//! ```
//!
//! Tags and fields are emitted in key order. Timestamps are nanoseconds
//! since the Unix epoch.

use crate::error::{BridgeError, Result};
use crate::types::{DataPoint, FieldValue};
use chrono::Utc;

/// Characters escaped in measurement names
const MEASUREMENT_SPECIAL: &[char] = &['\\', ',', ' '];
/// Characters escaped in tag keys, tag values and field keys
const KEY_SPECIAL: &[char] = &['\\', ',', '=', ' '];

/// Encode one data point as a line (without trailing newline)
///
/// A point without a timestamp is encoded with the current time.
pub fn encode_point(point: &DataPoint) -> Result<String> {
    reject_newlines("measurement", &point.measurement)?;
    if point.fields.is_empty() {
        return Err(BridgeError::InvalidDataPoint(
            "data point has no fields".to_string(),
        ));
    }

    let mut line = escape(&point.measurement, MEASUREMENT_SPECIAL);

    for (key, value) in &point.tags {
        reject_newlines("tag key", key)?;
        reject_newlines("tag value", value)?;
        if value.is_empty() {
            return Err(BridgeError::InvalidDataPoint(format!(
                "tag '{}' has an empty value",
                key
            )));
        }
        line.push(',');
        line.push_str(&escape(key, KEY_SPECIAL));
        line.push('=');
        line.push_str(&escape(value, KEY_SPECIAL));
    }

    line.push(' ');
    for (i, (key, value)) in point.fields.iter().enumerate() {
        reject_newlines("field key", key)?;
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape(key, KEY_SPECIAL));
        line.push('=');
        line.push_str(&encode_field(key, value)?);
    }

    let timestamp = point.timestamp.unwrap_or_else(Utc::now);
    let nanos = timestamp.timestamp_nanos_opt().ok_or_else(|| {
        BridgeError::InvalidDataPoint(format!(
            "timestamp {} is outside the representable range",
            timestamp
        ))
    })?;
    line.push(' ');
    line.push_str(&nanos.to_string());

    Ok(line)
}

fn encode_field(key: &str, value: &FieldValue) -> Result<String> {
    Ok(match value {
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Integer(i) => format!("{}i", i),
        FieldValue::UInteger(u) => format!("{}u", u),
        FieldValue::Float(f) => {
            if !f.is_finite() {
                return Err(BridgeError::InvalidDataPoint(format!(
                    "field '{}' is not a finite number",
                    key
                )));
            }
            f.to_string()
        }
        FieldValue::String(s) => format!("\"{}\"", escape(s, &['"', '\\'])),
    })
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn reject_newlines(what: &str, value: &str) -> Result<()> {
    if value.contains(['\n', '\r']) {
        return Err(BridgeError::InvalidDataPoint(format!(
            "{} '{}' contains a line break",
            what,
            value.escape_debug()
        )));
    }
    Ok(())
}
