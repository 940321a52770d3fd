//! Telemetry store boundary
//!
//! Reads the fleet's robot telemetry (battery energy, pose) and writes
//! migration outcome records. Both sides are best-effort: a read failure
//! degrades one node's snapshot, a write failure is logged and dropped.

mod influx;

pub use influx::{InfluxConfig, InfluxTelemetry};

use crate::models::MigrationRecord;
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// Faults raised by the telemetry transport
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("telemetry store returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed telemetry response: {0}")]
    Decode(String),
}

/// Accessor for the most recent robot telemetry samples
#[async_trait]
pub trait TelemetryAccessor: Send + Sync {
    /// Latest battery energy in watt-hours within the lookback window
    async fn latest_battery(&self, node: &str) -> Result<Option<f64>, TelemetryError>;

    /// Latest (x, y) pose within the lookback window
    async fn latest_pose(&self, node: &str) -> Result<Option<(f64, f64)>, TelemetryError>;
}

/// Write-only sink for migration outcome records
#[async_trait]
pub trait MigrationSink: Send + Sync {
    async fn record_migration(&self, record: &MigrationRecord) -> Result<()>;
}

/// Sink used when no telemetry write credentials are configured
pub struct NoopSink;

#[async_trait]
impl MigrationSink for NoopSink {
    async fn record_migration(&self, record: &MigrationRecord) -> Result<()> {
        warn!(
            pod = %record.pod_name,
            success = record.success,
            "No telemetry token configured, migration metric dropped"
        );
        Ok(())
    }
}
