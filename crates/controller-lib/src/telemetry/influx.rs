//! InfluxDB 2.x telemetry accessor
//!
//! Battery and pose samples are read with Flux `last()` queries over the
//! `/api/v2/query` endpoint (annotated CSV responses); migration records are
//! written as line protocol through `/api/v2/write`.

use super::{MigrationSink, TelemetryAccessor, TelemetryError};
use crate::models::MigrationRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Lookback window for "latest" sample queries
const LOOKBACK: &str = "-30m";

/// Connection settings for the telemetry store
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    pub timeout: Duration,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://influxdb.tbot-monitoring.svc.cluster.local:8086".to_string(),
            token: String::new(),
            org: "keti".to_string(),
            bucket: "turtlebot".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Telemetry accessor and migration sink backed by InfluxDB
pub struct InfluxTelemetry {
    client: Client,
    base_url: Url,
    config: InfluxConfig,
}

impl InfluxTelemetry {
    pub fn new(config: InfluxConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let base_url = Url::parse(&config.url).context("Invalid telemetry store URL")?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// Run a Flux query and return `(field, value)` pairs from the result
    async fn query_fields(&self, flux: String) -> Result<Vec<(String, f64)>, TelemetryError> {
        let mut url = self
            .base_url
            .join("/api/v2/query")
            .map_err(|e| TelemetryError::Decode(e.to_string()))?;
        url.query_pairs_mut().append_pair("org", &self.config.org);

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Token {}", self.config.token))
            .header("Content-Type", "application/vnd.flux")
            .header("Accept", "application/csv")
            .body(flux)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TelemetryError::Status(response.status()));
        }

        let body = response.text().await?;
        parse_annotated_csv(&body)
    }

    fn battery_flux(&self, node: &str) -> String {
        format!(
            "from(bucket: \"{bucket}\")\n  \
             |> range(start: {LOOKBACK})\n  \
             |> filter(fn: (r) => r._measurement == \"battery\" and \
             r.bot == \"{node}\" and r._field == \"wh\")\n  \
             |> last()",
            bucket = self.config.bucket,
        )
    }

    fn pose_flux(&self, node: &str) -> String {
        format!(
            "from(bucket: \"{bucket}\")\n  \
             |> range(start: {LOOKBACK})\n  \
             |> filter(fn: (r) => r._measurement == \"pose\" and r.bot == \"{node}\" and \
             (r._field == \"x\" or r._field == \"y\"))\n  \
             |> last()",
            bucket = self.config.bucket,
        )
    }
}

#[async_trait]
impl TelemetryAccessor for InfluxTelemetry {
    async fn latest_battery(&self, node: &str) -> Result<Option<f64>, TelemetryError> {
        let fields = self.query_fields(self.battery_flux(node)).await?;
        let wh = fields
            .iter()
            .find(|(field, _)| field == "wh")
            .map(|(_, value)| *value);
        debug!(node = %node, battery_wh = ?wh, "Battery query complete");
        Ok(wh)
    }

    async fn latest_pose(&self, node: &str) -> Result<Option<(f64, f64)>, TelemetryError> {
        let fields = self.query_fields(self.pose_flux(node)).await?;
        let by_field: HashMap<&str, f64> = fields
            .iter()
            .map(|(field, value)| (field.as_str(), *value))
            .collect();

        // Both coordinates must be present for a usable pose
        match (by_field.get("x"), by_field.get("y")) {
            (Some(&x), Some(&y)) => Ok(Some((x, y))),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl MigrationSink for InfluxTelemetry {
    async fn record_migration(&self, record: &MigrationRecord) -> Result<()> {
        let mut url = self
            .base_url
            .join("/api/v2/write")
            .context("Invalid write URL")?;
        url.query_pairs_mut()
            .append_pair("org", &self.config.org)
            .append_pair("bucket", &self.config.bucket)
            .append_pair("precision", "ns");

        let line = migration_line(record);
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Token {}", self.config.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await
            .context("Failed to write migration metric")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Telemetry store rejected migration metric: {}",
                response.status()
            );
        }
        Ok(())
    }
}

/// Render one migration record as an InfluxDB line protocol entry
fn migration_line(record: &MigrationRecord) -> String {
    format!(
        "pod_migration,pod_name={},source_node={},target_node={},success={} migration_count=1i {}",
        escape_tag(&record.pod_name),
        escape_tag(&record.source_node),
        escape_tag(&record.target_node),
        record.success,
        record.timestamp_ns,
    )
}

/// Escape tag values per the line protocol rules
fn escape_tag(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Extract `(field, value)` pairs from an annotated CSV query response
fn parse_annotated_csv(body: &str) -> Result<Vec<(String, f64)>, TelemetryError> {
    let mut field_idx = None;
    let mut value_idx = None;
    let mut results = Vec::new();

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let columns: Vec<&str> = line.split(',').collect();
        if field_idx.is_none() {
            // First unannotated row is the header
            field_idx = columns.iter().position(|c| *c == "_field");
            value_idx = columns.iter().position(|c| *c == "_value");
            if field_idx.is_none() || value_idx.is_none() {
                return Err(TelemetryError::Decode(
                    "query response missing _field/_value columns".to_string(),
                ));
            }
            continue;
        }

        let (fi, vi) = (field_idx.unwrap(), value_idx.unwrap());
        if columns.len() <= fi.max(vi) {
            continue;
        }
        if let Ok(value) = columns[vi].parse::<f64>() {
            results.push((columns[fi].to_string(), value));
        }
    }

    // No data rows at all is valid: nothing reported within the window
    Ok(results)
}
