//! Controller configuration

use anyhow::Result;
use serde::Deserialize;

/// Controller configuration, loaded from `FLEET_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Scheduler identity pods must request to be admitted here
    #[serde(default = "default_scheduler_name")]
    pub scheduler_name: String,

    /// Label selector restricting eligible worker nodes
    #[serde(default = "default_node_label_selector")]
    pub node_label_selector: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Telemetry store endpoint
    #[serde(default = "default_influx_url")]
    pub influx_url: String,

    /// Telemetry store API token; empty disables metric writes
    #[serde(default)]
    pub influx_token: String,

    /// Telemetry store organization
    #[serde(default = "default_influx_org")]
    pub influx_org: String,

    /// Telemetry store bucket
    #[serde(default = "default_influx_bucket")]
    pub influx_bucket: String,

    /// Policy engine endpoint
    #[serde(default = "default_policy_engine_url")]
    pub policy_engine_url: String,

    /// Pressure scan interval in seconds
    #[serde(default = "default_check_interval")]
    pub migration_check_interval_secs: u64,

    /// Resource pressure threshold percentage (strictly greater trips it)
    #[serde(default = "default_resource_threshold")]
    pub resource_pressure_threshold: f64,

    /// Whether to request checkpoints around migrations
    #[serde(default = "default_true")]
    pub enable_checkpointing: bool,

    /// Whether an unreachable policy engine counts as permission
    #[serde(default = "default_true")]
    pub policy_fail_open: bool,

    /// Whether a deployment rollout timeout fails the migration
    #[serde(default)]
    pub rollout_timeout_fails: bool,
}

fn default_scheduler_name() -> String {
    "sdi-scheduler".to_string()
}

fn default_node_label_selector() -> String {
    "kubernetes.io/arch=arm64".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_influx_url() -> String {
    "http://influxdb.tbot-monitoring.svc.cluster.local:8086".to_string()
}

fn default_influx_org() -> String {
    "keti".to_string()
}

fn default_influx_bucket() -> String {
    "turtlebot".to_string()
}

fn default_policy_engine_url() -> String {
    "http://policy-engine.orchestration-engines.svc.cluster.local:8080".to_string()
}

fn default_check_interval() -> u64 {
    30
}

fn default_resource_threshold() -> f64 {
    85.0
}

fn default_true() -> bool {
    true
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("FLEET"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| ControllerConfig {
            scheduler_name: default_scheduler_name(),
            node_label_selector: default_node_label_selector(),
            api_port: default_api_port(),
            influx_url: default_influx_url(),
            influx_token: String::new(),
            influx_org: default_influx_org(),
            influx_bucket: default_influx_bucket(),
            policy_engine_url: default_policy_engine_url(),
            migration_check_interval_secs: default_check_interval(),
            resource_pressure_threshold: default_resource_threshold(),
            enable_checkpointing: default_true(),
            policy_fail_open: default_true(),
            rollout_timeout_fails: false,
        }))
    }
}
