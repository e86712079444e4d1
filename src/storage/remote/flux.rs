//! Flux query building and annotated CSV decoding
//!
//! Query responses are requested with a `datatype` annotation row so that
//! cell values can be typed without guessing:
//!
//! ```text
//! #datatype,string,long,dateTime:RFC3339,double,string,string,string
//! ,result,table,_time,_value,_field,_measurement,room
//! ,_result,0,2024-01-01T00:00:00Z,21.5,temp,env,lab
//! ```
//!
//! A response can hold several tables, separated by blank lines, each with
//! its own annotation and header rows. Every data row becomes a
//! [`FluxRow`]; rows sharing measurement, tag set and time are then merged
//! back into one [`DataPoint`] per write.

use crate::error::{BridgeError, Result};
use crate::types::{DataPoint, FieldValue, Fields, QueryRange, Tags};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::collections::BTreeMap;

/// Annotation columns leading every table header, by position
const ANNOTATION_COLUMNS: &[&str] = &["", "result", "table"];

fn is_annotation_column(idx: usize, name: &str) -> bool {
    ANNOTATION_COLUMNS.get(idx) == Some(&name)
}

/// The service reports failures as a table without any data columns
fn is_error_table(columns: &[String]) -> bool {
    columns.iter().any(|c| c == "error")
        && !columns.iter().any(|c| c == "_time" || c == "_measurement")
}

/// One decoded result row
#[derive(Debug, Clone, PartialEq)]
pub struct FluxRow {
    /// `_time` column
    pub time: Option<DateTime<Utc>>,
    /// `_value` column
    pub value: Option<FieldValue>,
    /// Every non-empty data column, including `_time` and `_value`
    pub columns: BTreeMap<String, FieldValue>,
}

impl FluxRow {
    fn text(&self, column: &str) -> Option<&str> {
        match self.columns.get(column) {
            Some(FieldValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Tag columns: everything not starting with `_`
    pub fn tags(&self) -> Tags {
        self.columns
            .iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .filter_map(|(name, value)| match value {
                FieldValue::String(s) => Some((name.clone(), s.clone())),
                _ => None,
            })
            .collect()
    }
}

/// Escape text for use inside a Flux string literal
pub fn escape_string(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace("${", "\\${")
}

fn flux_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Build the range query for one measurement
///
/// Flux ranges exclude `stop`, so the end is pushed out by one nanosecond
/// to keep the window inclusive.
pub fn range_query(bucket: &str, measurement: &str, range: &QueryRange) -> String {
    let stop = range
        .end
        .checked_add_signed(Duration::nanoseconds(1))
        .unwrap_or(range.end);
    format!(
        "from(bucket: \"{}\")\n  |> range(start: {}, stop: {})\n  |> filter(fn: (r) => r[\"_measurement\"] == \"{}\")",
        escape_string(bucket),
        flux_time(range.start),
        flux_time(stop),
        escape_string(measurement),
    )
}

/// Split one CSV record into cells (RFC 4180 quoting)
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    cell.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if cell.is_empty() => in_quotes = true,
            ',' if !in_quotes => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}

/// Split CSV text into records, keeping line breaks inside quoted cells
fn csv_records(body: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in body.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '\n' if !in_quotes => {
                if current.ends_with('\r') {
                    current.pop();
                }
                records.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

fn decode_cell(datatype: &str, raw: &str) -> Option<FieldValue> {
    if raw.is_empty() {
        return None;
    }
    let value = match datatype {
        "long" => raw.parse().ok().map(FieldValue::Integer),
        "unsignedLong" => raw.parse().ok().map(FieldValue::UInteger),
        "double" => raw.parse().ok().map(FieldValue::Float),
        "boolean" => match raw {
            "true" => Some(FieldValue::Bool(true)),
            "false" => Some(FieldValue::Bool(false)),
            _ => None,
        },
        _ => None,
    };
    Some(value.unwrap_or_else(|| FieldValue::String(raw.to_string())))
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Decode an annotated CSV query response
///
/// The leading `result` and `table` columns are dropped by position, so tags
/// with those names survive. A table with an `error` column and no `_time`
/// or `_measurement` is the service reporting a failure; it is returned as
/// `RemoteQuery`.
pub fn parse_annotated_csv(body: &str) -> Result<Vec<FluxRow>> {
    let mut rows = Vec::new();
    let mut datatypes: Vec<String> = Vec::new();
    let mut header: Option<Vec<String>> = None;

    for record in csv_records(body) {
        if record.trim().is_empty() {
            datatypes.clear();
            header = None;
            continue;
        }

        let cells = split_csv_line(&record);
        if cells.first().is_some_and(|c| c.starts_with('#')) {
            if cells[0] == "#datatype" {
                datatypes = cells;
            }
            continue;
        }

        let Some(columns) = header.as_ref() else {
            header = Some(cells);
            continue;
        };

        if is_error_table(columns) {
            let idx = columns.iter().position(|c| c == "error").unwrap_or(0);
            let message = cells.get(idx).cloned().unwrap_or_default();
            return Err(BridgeError::RemoteQuery(message));
        }

        let mut row = FluxRow {
            time: None,
            value: None,
            columns: BTreeMap::new(),
        };
        for (idx, name) in columns.iter().enumerate() {
            if name.is_empty() || is_annotation_column(idx, name) {
                continue;
            }
            let raw = cells.get(idx).map(String::as_str).unwrap_or("");
            let datatype = datatypes.get(idx).map(String::as_str).unwrap_or("string");
            let value = match decode_cell(datatype, raw) {
                Some(value) => value,
                // An empty string field is still a value
                None if name == "_value" && datatype == "string" => {
                    FieldValue::String(String::new())
                }
                None => continue,
            };
            match name.as_str() {
                "_time" => row.time = parse_time(raw),
                "_value" => row.value = Some(value.clone()),
                _ => {}
            }
            row.columns.insert(name.clone(), value);
        }
        rows.push(row);
    }

    Ok(rows)
}

/// Merge per-field rows back into data points, ordered by time
pub fn rows_to_points(rows: Vec<FluxRow>) -> Vec<DataPoint> {
    let mut grouped: BTreeMap<(DateTime<Utc>, String, Tags), Fields> = BTreeMap::new();

    for row in rows {
        let (Some(time), Some(value)) = (row.time, row.value.clone()) else {
            tracing::debug!("Skipping result row without time or value: {:?}", row.columns);
            continue;
        };
        let (Some(measurement), Some(field)) = (row.text("_measurement"), row.text("_field"))
        else {
            tracing::debug!("Skipping result row without measurement or field: {:?}", row.columns);
            continue;
        };

        grouped
            .entry((time, measurement.to_string(), row.tags()))
            .or_default()
            .insert(field.to_string(), value);
    }

    grouped
        .into_iter()
        .map(|((time, measurement, tags), fields)| DataPoint {
            measurement,
            tags,
            fields,
            timestamp: Some(time),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RESPONSE: &str = "#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string,string,string\r\n\
,result,table,_start,_stop,_time,_value,_field,_measurement,room\r\n\
,_result,0,2024-01-01T00:00:00Z,2024-01-02T00:00:00Z,2024-01-01T10:00:00Z,21.5,temp,env,lab\r\n\
,_result,0,2024-01-01T00:00:00Z,2024-01-02T00:00:00Z,2024-01-01T11:00:00Z,22,temp,env,lab\r\n\
\r\n\
#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,long,string,string,string\r\n\
,result,table,_start,_stop,_time,_value,_field,_measurement,room\r\n\
,_result,1,2024-01-01T00:00:00Z,2024-01-02T00:00:00Z,2024-01-01T10:00:00Z,3,count,env,lab\r\n\
\r\n";

    #[test]
    fn test_parse_multi_table_response() {
        let rows = parse_annotated_csv(RESPONSE).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].value, Some(FieldValue::Float(21.5)));
        assert_eq!(rows[1].value, Some(FieldValue::Float(22.0)));
        assert_eq!(rows[2].value, Some(FieldValue::Integer(3)));
        assert_eq!(
            rows[0].time,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(rows[0].tags().get("room").map(String::as_str), Some("lab"));
        assert!(!rows[0].tags().contains_key("result"));
    }

    #[test]
    fn test_rows_merge_into_points() {
        let points = rows_to_points(parse_annotated_csv(RESPONSE).unwrap());
        assert_eq!(points.len(), 2);

        let first = &points[0];
        assert_eq!(first.measurement, "env");
        assert_eq!(first.tags.get("room").map(String::as_str), Some("lab"));
        assert_eq!(first.fields.len(), 2);
        assert_eq!(first.fields["temp"], FieldValue::Float(21.5));
        assert_eq!(first.fields["count"], FieldValue::Integer(3));
        assert_eq!(points[1].fields["temp"], FieldValue::Float(22.0));
    }

    #[test]
    fn test_quoted_cells() {
        let body = "#datatype,string,long,dateTime:RFC3339,string,string,string\n\
,result,table,_time,_value,_field,_measurement\n\
,_result,0,2024-01-01T00:00:00Z,\"a, \"\"quoted\"\"\nvalue\",note,log\n";
        let rows = parse_annotated_csv(body).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].value,
            Some(FieldValue::String("a, \"quoted\"\nvalue".to_string()))
        );
    }

    #[test]
    fn test_empty_string_value_is_kept() {
        let body = "#datatype,string,long,dateTime:RFC3339,string,string,string\n\
,result,table,_time,_value,_field,_measurement\n\
,_result,0,2024-01-01T00:00:00Z,,note,log\n";
        let rows = parse_annotated_csv(body).unwrap();
        assert_eq!(rows[0].value, Some(FieldValue::String(String::new())));
    }

    #[test]
    fn test_error_table_is_query_error() {
        let body = ",error,reference\n,bucket \"nope\" not found,\n";
        let err = parse_annotated_csv(body).unwrap_err();
        match err {
            BridgeError::RemoteQuery(message) => assert!(message.contains("not found")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_named_tag_is_data() {
        let body = "#datatype,string,long,dateTime:RFC3339,double,string,string,string\n\
,result,table,_time,_value,_field,_measurement,error\n\
,_result,0,2024-01-01T00:00:00Z,1.5,value,dev,E1\n";
        let points = rows_to_points(parse_annotated_csv(body).unwrap());
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].tags.get("error").map(String::as_str), Some("E1"));
        assert_eq!(points[0].fields["value"], FieldValue::Float(1.5));
    }

    #[test]
    fn test_result_and_table_tags_are_kept() {
        let body = "#datatype,string,long,dateTime:RFC3339,double,string,string,string,string,string\n\
,result,table,_time,_value,_field,_measurement,result,room,table\n\
,_result,0,2024-01-01T00:00:00Z,2,value,dev,pass,lab,t7\n";
        let rows = parse_annotated_csv(body).unwrap();
        let tags = rows[0].tags();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags["result"], "pass");
        assert_eq!(tags["room"], "lab");
        assert_eq!(tags["table"], "t7");
    }

    #[test]
    fn test_empty_response() {
        assert!(parse_annotated_csv("").unwrap().is_empty());
        assert!(parse_annotated_csv("\r\n").unwrap().is_empty());
    }

    #[test]
    fn test_range_query_escapes_and_is_inclusive() {
        let range = QueryRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        );
        let query = range_query("my\"bucket", "temp${x}", &range);
        assert!(query.contains("from(bucket: \"my\\\"bucket\")"));
        assert!(query.contains("start: 2024-01-01T00:00:00.000000000Z"));
        assert!(query.contains("stop: 2024-01-02T00:00:00.000000001Z"));
        assert!(query.contains("== \"temp\\${x}\""));
    }
}
