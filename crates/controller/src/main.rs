//! Fleet controller - energy-aware scheduling and migration control plane
//!
//! Runs two independent control loops against one Kubernetes cluster:
//! the admission loop binding unscheduled pods by battery energy (MALE
//! policy) and the pressure monitor relocating pods off overloaded nodes.

use anyhow::{Context, Result};
use controller_lib::{
    checkpoint::{Checkpointer, NoopCheckpointer, SimulatedCheckpointer},
    cluster::{ClusterAccessor, KubeCluster},
    health::{components, HealthRegistry},
    migration::{ExecutorConfig, MigrationExecutor, MonitorConfig, PressureMonitor},
    observability::{ControlPlaneMetrics, StructuredLogger},
    policy::PolicyEngineClient,
    scheduling::{AdmissionConfig, AdmissionLoop},
    state::NodeStateAggregator,
    telemetry::{InfluxConfig, InfluxTelemetry, MigrationSink, NoopSink},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting fleet-controller");

    let config = config::ControllerConfig::load()?;
    info!(scheduler = %config.scheduler_name, "Controller configured");

    // Collaborator handles, constructed once and injected everywhere
    let client = kube::Client::try_default()
        .await
        .context("Failed to connect to the cluster API")?;
    let cluster: Arc<dyn ClusterAccessor> = Arc::new(KubeCluster::new(client));

    let telemetry = Arc::new(InfluxTelemetry::new(InfluxConfig {
        url: config.influx_url.clone(),
        token: config.influx_token.clone(),
        org: config.influx_org.clone(),
        bucket: config.influx_bucket.clone(),
        timeout: Duration::from_secs(5),
    })?);

    let sink: Arc<dyn MigrationSink> = if config.influx_token.is_empty() {
        warn!("Telemetry token not provided, migration metrics will not be written");
        Arc::new(NoopSink)
    } else {
        telemetry.clone()
    };

    let policy = Arc::new(PolicyEngineClient::new(
        &config.policy_engine_url,
        config.policy_fail_open,
    )?);

    let checkpointer: Arc<dyn Checkpointer> = if config.enable_checkpointing {
        Arc::new(SimulatedCheckpointer)
    } else {
        Arc::new(NoopCheckpointer)
    };

    // Health and metrics
    let health_registry = HealthRegistry::new();
    health_registry.register(components::ADMISSION).await;
    health_registry.register(components::PRESSURE_MONITOR).await;
    health_registry.register(components::TELEMETRY).await;
    health_registry.register(components::POLICY_ENGINE).await;

    let metrics = ControlPlaneMetrics::new();
    let logger = StructuredLogger::new(&config.scheduler_name);
    logger.log_startup(CONTROLLER_VERSION);

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));

    // Control loops
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let admission = AdmissionLoop::new(
        cluster.clone(),
        NodeStateAggregator::new(cluster.clone(), telemetry.clone()),
        AdmissionConfig {
            scheduler_name: config.scheduler_name.clone(),
            node_label_selector: config.node_label_selector.clone(),
            restart_delay: Duration::from_secs(5),
        },
    );

    let executor = Arc::new(MigrationExecutor::new(
        cluster.clone(),
        NodeStateAggregator::new(cluster.clone(), telemetry.clone()),
        policy,
        checkpointer,
        sink,
        ExecutorConfig {
            rollout_timeout_fails: config.rollout_timeout_fails,
            ..ExecutorConfig::default()
        },
    ));

    let monitor = PressureMonitor::new(
        cluster.clone(),
        NodeStateAggregator::new(cluster.clone(), telemetry),
        executor,
        MonitorConfig {
            check_interval: Duration::from_secs(config.migration_check_interval_secs),
            pressure_threshold: config.resource_pressure_threshold,
            ..MonitorConfig::default()
        },
    );

    let admission_handle = tokio::spawn(admission.run(shutdown_tx.subscribe()));
    let monitor_handle = tokio::spawn(monitor.run(shutdown_tx.subscribe()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    health_registry.set_ready(true).await;

    // Wait for shutdown signal; in-flight cluster calls finish or fail
    // cleanly, no partial-bind rollback exists
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    let _ = admission_handle.await;
    let _ = monitor_handle.await;
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
