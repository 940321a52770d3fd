//! Observability infrastructure for the control plane
//!
//! Provides:
//! - Prometheus metrics (bind/migration outcomes, pressure scans, loop latency)
//! - Structured JSON logging with tracing for scheduling and migration events

use prometheus::{register_histogram, register_int_gauge, Histogram, IntGauge};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for loop latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ControlPlaneMetricsInner> = OnceLock::new();

struct ControlPlaneMetricsInner {
    scheduling_latency_seconds: Histogram,
    migration_duration_seconds: Histogram,
    pods_bound: IntGauge,
    bind_errors: IntGauge,
    migrations_succeeded: IntGauge,
    migrations_failed: IntGauge,
    pressured_nodes: IntGauge,
    watch_restarts: IntGauge,
}

impl ControlPlaneMetricsInner {
    fn new() -> Self {
        Self {
            scheduling_latency_seconds: register_histogram!(
                "fleet_controller_scheduling_latency_seconds",
                "Time spent from pod event to bind decision",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register scheduling_latency_seconds"),

            migration_duration_seconds: register_histogram!(
                "fleet_controller_migration_duration_seconds",
                "Time spent executing a single pod migration",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register migration_duration_seconds"),

            pods_bound: register_int_gauge!(
                "fleet_controller_pods_bound_total",
                "Total number of pods bound by the admission loop"
            )
            .expect("Failed to register pods_bound"),

            bind_errors: register_int_gauge!(
                "fleet_controller_bind_errors_total",
                "Total number of failed bind requests"
            )
            .expect("Failed to register bind_errors"),

            migrations_succeeded: register_int_gauge!(
                "fleet_controller_migrations_succeeded_total",
                "Total number of successful pod migrations"
            )
            .expect("Failed to register migrations_succeeded"),

            migrations_failed: register_int_gauge!(
                "fleet_controller_migrations_failed_total",
                "Total number of failed pod migrations"
            )
            .expect("Failed to register migrations_failed"),

            pressured_nodes: register_int_gauge!(
                "fleet_controller_pressured_nodes",
                "Nodes over the resource pressure threshold in the last scan"
            )
            .expect("Failed to register pressured_nodes"),

            watch_restarts: register_int_gauge!(
                "fleet_controller_watch_restarts_total",
                "Total number of pod watch stream restarts"
            )
            .expect("Failed to register watch_restarts"),
        }
    }
}

/// Control plane metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ControlPlaneMetrics {
    _private: (),
}

impl Default for ControlPlaneMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPlaneMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ControlPlaneMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ControlPlaneMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_scheduling_latency(&self, duration_secs: f64) {
        self.inner().scheduling_latency_seconds.observe(duration_secs);
    }

    pub fn observe_migration_duration(&self, duration_secs: f64) {
        self.inner().migration_duration_seconds.observe(duration_secs);
    }

    pub fn inc_pods_bound(&self) {
        self.inner().pods_bound.inc();
    }

    pub fn inc_bind_errors(&self) {
        self.inner().bind_errors.inc();
    }

    pub fn inc_migrations(&self, success: bool) {
        if success {
            self.inner().migrations_succeeded.inc();
        } else {
            self.inner().migrations_failed.inc();
        }
    }

    pub fn set_pressured_nodes(&self, count: i64) {
        self.inner().pressured_nodes.set(count);
    }

    pub fn inc_watch_restarts(&self) {
        self.inner().watch_restarts.inc();
    }
}

/// Structured logger for control plane events
///
/// Consistent JSON-formatted logging for bind decisions, pressure
/// detections and migration outcomes.
#[derive(Clone)]
pub struct StructuredLogger {
    scheduler_name: String,
}

impl StructuredLogger {
    pub fn new(scheduler_name: impl Into<String>) -> Self {
        Self {
            scheduler_name: scheduler_name.into(),
        }
    }

    /// Log a completed bind decision
    pub fn log_bind(&self, pod_name: &str, namespace: &str, node: &str, battery_wh: Option<f64>) {
        info!(
            event = "pod_bound",
            scheduler = %self.scheduler_name,
            pod_name = %pod_name,
            namespace = %namespace,
            node = %node,
            battery_wh = ?battery_wh,
            "Bound pod to node"
        );
    }

    /// Log a bind request that the API server rejected
    pub fn log_bind_failure(&self, pod_name: &str, namespace: &str, node: &str, error: &str) {
        warn!(
            event = "bind_failed",
            scheduler = %self.scheduler_name,
            pod_name = %pod_name,
            namespace = %namespace,
            node = %node,
            error = %error,
            "Bind request failed, pod stays unscheduled"
        );
    }

    /// Log a node crossing the pressure threshold
    pub fn log_pressure(&self, node: &str, cpu_percent: f64, mem_percent: f64, threshold: f64) {
        info!(
            event = "node_pressure",
            scheduler = %self.scheduler_name,
            node = %node,
            cpu_percent = cpu_percent,
            mem_percent = mem_percent,
            threshold = threshold,
            "Resource pressure detected"
        );
    }

    /// Log a migration outcome
    pub fn log_migration(
        &self,
        pod_name: &str,
        source_node: &str,
        target_node: &str,
        success: bool,
        detail: &str,
    ) {
        if success {
            info!(
                event = "pod_migrated",
                scheduler = %self.scheduler_name,
                pod_name = %pod_name,
                source_node = %source_node,
                target_node = %target_node,
                "Migration complete"
            );
        } else {
            warn!(
                event = "migration_failed",
                scheduler = %self.scheduler_name,
                pod_name = %pod_name,
                source_node = %source_node,
                target_node = %target_node,
                detail = %detail,
                "Migration failed"
            );
        }
    }

    /// Log controller startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "controller_started",
            scheduler = %self.scheduler_name,
            version = %version,
            "Fleet controller started"
        );
    }

    /// Log controller shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            scheduler = %self.scheduler_name,
            reason = %reason,
            "Fleet controller shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handle() {
        let metrics = ControlPlaneMetrics::new();
        metrics.observe_scheduling_latency(0.01);
        metrics.observe_migration_duration(1.5);
        metrics.inc_pods_bound();
        metrics.inc_bind_errors();
        metrics.inc_migrations(true);
        metrics.inc_migrations(false);
        metrics.set_pressured_nodes(2);
        metrics.inc_watch_restarts();
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("sdi-scheduler");
        assert_eq!(logger.scheduler_name, "sdi-scheduler");
    }
}
