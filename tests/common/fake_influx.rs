//! HTTP server standing in for the remote time-series service
//!
//! [`FakeInflux::start`] answers each connection with the next scripted
//! response, in order. [`FakeInflux::recording`] behaves like a tiny
//! service instead: line protocol writes are decoded and kept, and Flux
//! range queries are answered with annotated CSV built from them. Requests
//! are recorded before the (optionally delayed) response is sent.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A request as seen by the fake server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One scripted reply
#[derive(Debug, Clone)]
pub struct FakeResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub delay: Duration,
}

impl FakeResponse {
    pub fn no_content() -> Self {
        Self::new(204, "text/plain", "")
    }

    pub fn csv(body: &str) -> Self {
        Self::new(200, "text/csv; charset=utf-8", body)
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self::new(status, "application/json", body)
    }

    pub fn new(status: u16, content_type: &'static str, body: &str) -> Self {
        Self {
            status,
            content_type,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub struct FakeInflux {
    url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeInflux {
    /// Bind to a free local port and serve `responses` in order
    pub fn start(responses: Vec<FakeResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake server");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        std::thread::spawn(move || {
            for response in responses {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                serve_one(stream, &response, &recorded);
            }
        });

        Self { url, requests }
    }

    /// Bind to a free local port and answer writes and queries from memory
    pub fn recording() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake server");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        std::thread::spawn(move || {
            let mut stored: Vec<StoredPoint> = Vec::new();
            for stream in listener.incoming() {
                let Ok(stream) = stream else {
                    return;
                };
                let mut reader = BufReader::new(stream);
                let Some(request) = read_request(&mut reader) else {
                    continue;
                };
                recorded.lock().unwrap().push(request.clone());

                let response = if request.target.starts_with("/api/v2/write") {
                    stored.extend(request.body.lines().filter(|l| !l.is_empty()).map(parse_line));
                    FakeResponse::no_content()
                } else if request.target.starts_with("/api/v2/query") {
                    FakeResponse::csv(&answer_query(&request.body, &stored))
                } else {
                    FakeResponse::json(404, r#"{"code":"not found","message":"no such route"}"#)
                };
                write_reply(reader.into_inner(), &response);
            }
        });

        Self { url, requests }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn serve_one(stream: TcpStream, response: &FakeResponse, recorded: &Mutex<Vec<RecordedRequest>>) {
    let mut reader = BufReader::new(stream);
    let Some(request) = read_request(&mut reader) else {
        return;
    };
    recorded.lock().unwrap().push(request);
    write_reply(reader.into_inner(), response);
}

fn read_request(reader: &mut BufReader<TcpStream>) -> Option<RecordedRequest> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).ok()?;

    Some(RecordedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn write_reply(mut stream: TcpStream, response: &FakeResponse) {
    std::thread::sleep(response.delay);

    let reply = format!(
        "HTTP/1.1 {} Fake\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        response.content_type,
        response.body.len(),
        response.body
    );
    let _ = stream.write_all(reply.as_bytes());
    let _ = stream.flush();
}

// ==================== Recording service ====================

/// One written line, decoded
#[derive(Debug, Clone)]
struct StoredPoint {
    measurement: String,
    tags: BTreeMap<String, String>,
    /// Field name, CSV datatype and cell text
    fields: Vec<(String, &'static str, String)>,
    nanos: i64,
}

/// Split at the first `limit - 1` unescaped `sep`, optionally ignoring
/// separators inside double quotes
fn split_unescaped(raw: &str, sep: char, limit: usize, quotes: bool) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut in_quotes = false;

    for (idx, c) in raw.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' if quotes => in_quotes = !in_quotes,
            c if c == sep && !in_quotes && pieces.len() + 1 < limit => {
                pieces.push(&raw[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&raw[start..]);
    pieces
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_field_value(raw: &str) -> (&'static str, String) {
    if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        ("string", unescape(inner))
    } else if let Some(n) = raw.strip_suffix('i') {
        ("long", n.to_string())
    } else if let Some(n) = raw.strip_suffix('u') {
        ("unsignedLong", n.to_string())
    } else if raw == "true" || raw == "false" {
        ("boolean", raw.to_string())
    } else {
        ("double", raw.to_string())
    }
}

fn parse_line(line: &str) -> StoredPoint {
    let head = split_unescaped(line, ' ', 2, false);
    let rest = split_unescaped(head[1], ' ', 2, true);
    let nanos = rest[1].trim().parse().expect("line protocol timestamp");

    let mut series = split_unescaped(head[0], ',', usize::MAX, false).into_iter();
    let measurement = unescape(series.next().unwrap_or_default());
    let tags = series
        .map(|pair| {
            let kv = split_unescaped(pair, '=', 2, false);
            (unescape(kv[0]), unescape(kv[1]))
        })
        .collect();

    let fields = split_unescaped(rest[0], ',', usize::MAX, true)
        .into_iter()
        .map(|pair| {
            let kv = split_unescaped(pair, '=', 2, true);
            let (datatype, text) = parse_field_value(kv[1]);
            (unescape(kv[0]), datatype, text)
        })
        .collect();

    StoredPoint {
        measurement,
        tags,
        fields,
        nanos,
    }
}

/// Read the Flux string literal that starts right after `marker`
fn flux_string_after(query: &str, marker: &str) -> Option<String> {
    let start = query.find(marker)? + marker.len();
    let mut out = String::new();
    let mut chars = query[start..].chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?),
            '"' => return Some(out),
            c => out.push(c),
        }
    }
    None
}

fn flux_time_after(query: &str, marker: &str) -> Option<DateTime<Utc>> {
    let start = query.find(marker)? + marker.len();
    let end = query[start..].find([',', ')'])? + start;
    DateTime::parse_from_rfc3339(query[start..end].trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn csv_cell(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Annotated CSV for a range query over what has been written
fn answer_query(body: &str, stored: &[StoredPoint]) -> String {
    let request: serde_json::Value = serde_json::from_str(body).expect("query body is JSON");
    let query = request["query"].as_str().expect("query text");
    let measurement = flux_string_after(query, "r[\"_measurement\"] == \"").expect("measurement");
    let start = flux_time_after(query, "start: ").expect("range start");
    let stop = flux_time_after(query, "stop: ").expect("range stop");
    let (from, to) = (
        start.timestamp_nanos_opt().expect("start in range"),
        stop.timestamp_nanos_opt().expect("stop in range"),
    );

    let mut out = String::new();
    let mut table = 0;
    for point in stored
        .iter()
        .filter(|p| p.measurement == measurement && p.nanos >= from && p.nanos < to)
    {
        let time = rfc3339(Utc.timestamp_nanos(point.nanos));
        for (field, datatype, text) in &point.fields {
            let mut types: Vec<&str> = vec![
                "#datatype",
                "string",
                "long",
                "dateTime:RFC3339",
                "dateTime:RFC3339",
                "dateTime:RFC3339",
                *datatype,
                "string",
                "string",
            ];
            let mut header: Vec<&str> = vec![
                "",
                "result",
                "table",
                "_start",
                "_stop",
                "_time",
                "_value",
                "_field",
                "_measurement",
            ];
            let table_id = table.to_string();
            let (start_text, stop_text) = (rfc3339(start), rfc3339(stop));
            let mut row: Vec<&str> = vec![
                "",
                "_result",
                table_id.as_str(),
                start_text.as_str(),
                stop_text.as_str(),
                time.as_str(),
                text.as_str(),
                field.as_str(),
                point.measurement.as_str(),
            ];
            for (key, value) in &point.tags {
                types.push("string");
                header.push(key);
                row.push(value);
            }

            for cells in [types, header, row] {
                let line: Vec<String> = cells.into_iter().map(csv_cell).collect();
                out.push_str(&line.join(","));
                out.push_str("\r\n");
            }
            out.push_str("\r\n");
            table += 1;
        }
    }
    if out.is_empty() {
        out.push_str("\r\n");
    }
    out
}
