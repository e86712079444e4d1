//! Remote time-series backend
//!
//! Talks to an InfluxDB 2.x compatible HTTP API:
//!
//! - writes go to `POST /api/v2/write` as line protocol
//! - queries go to `POST /api/v2/query` as Flux and come back as annotated CSV
//!
//! The HTTP client is async; the store owns a small current-thread runtime
//! and blocks on each call so callers stay synchronous. Every call runs
//! under the configured deadline and reports `Timeout` when it expires.

pub mod flux;
pub mod line_protocol;

use super::StorageBackend;
use crate::config::{BackendKind, RemoteConfig};
use crate::error::{BridgeError, Result};
use crate::types::{DataPoint, QueryRange};
use std::future::Future;

/// Client for the remote time-series service
pub struct RemoteTimeSeriesStore {
    config: RemoteConfig,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl std::fmt::Debug for RemoteTimeSeriesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTimeSeriesStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RemoteTimeSeriesStore {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        reqwest::Url::parse(&config.url).map_err(|e| {
            BridgeError::Config(format!("invalid remote url '{}': {}", config.url, e))
        })?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {}", e)))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()?;

        Ok(Self {
            config,
            client,
            runtime,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.config.token)
    }

    /// Run `future` to completion under the configured deadline
    fn block_on<T>(&self, what: &str, future: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.timeout();
        self.runtime
            .block_on(async { tokio::time::timeout(timeout, future).await })
            .map_err(|_| {
                BridgeError::Timeout(format!("{} did not complete within {:?}", what, timeout))
            })?
    }

    /// Probe the service's health endpoint and return its reported status
    pub fn health(&self) -> Result<String> {
        let url = self.endpoint("/health");
        self.block_on("health check", async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| BridgeError::RemoteQuery(e.to_string()))?;
            let status = response.status();
            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| BridgeError::RemoteQuery(e.to_string()))?;
            let reported = body
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or(status.as_str())
                .to_string();
            if status.is_success() {
                Ok(reported)
            } else {
                Err(BridgeError::RemoteQuery(format!("{}: {}", status, reported)))
            }
        })
    }

    async fn send_write(&self, body: String) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("/api/v2/write"))
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| BridgeError::RemoteWrite(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(BridgeError::RemoteWrite(format!("{}: {}", status, text.trim())))
    }

    async fn send_query(&self, query: String) -> Result<String> {
        let body = serde_json::json!({
            "query": query,
            "type": "flux",
            "dialect": {
                "header": true,
                "annotations": ["datatype"],
                "delimiter": ",",
            },
        });
        let response = self
            .client
            .post(self.endpoint("/api/v2/query"))
            .query(&[("org", self.config.org.as_str())])
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header(reqwest::header::ACCEPT, "application/csv")
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::RemoteQuery(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BridgeError::RemoteQuery(e.to_string()))?;
        if status.is_success() {
            Ok(text)
        } else {
            Err(BridgeError::RemoteQuery(format!("{}: {}", status, text.trim())))
        }
    }
}

impl StorageBackend for RemoteTimeSeriesStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn persist(&self, point: &DataPoint) -> Result<()> {
        let line = line_protocol::encode_point(point)?;
        tracing::debug!("Writing to {}: {}", self.config.bucket, line);
        self.block_on("remote write", self.send_write(line))
    }

    fn query(&self, measurement: &str, range: &QueryRange) -> Result<Vec<DataPoint>> {
        let query = flux::range_query(&self.config.bucket, measurement, range);
        tracing::debug!("Running Flux query:\n{}", query);

        let csv = self.block_on("remote query", self.send_query(query))?;
        let rows = flux::parse_annotated_csv(&csv)?;
        let points = flux::rows_to_points(rows);
        tracing::debug!(
            "Remote query for {} returned {} points",
            measurement,
            points.len()
        );
        Ok(points)
    }
}
