//! Resource pressure monitor
//!
//! Periodic scan over all non-control-plane nodes. A node is under
//! pressure when its CPU or memory request utilization strictly exceeds
//! the configured threshold; up to three resident pods per pressured node
//! are handed to the migration executor each cycle, spaced by a fixed
//! delay to avoid a thundering-herd relocation. A failed cycle never
//! terminates the loop.

use super::{MigrationExecutor, CONTROL_PLANE_LABEL};
use crate::cluster::ClusterAccessor;
use crate::models::NodeState;
use crate::observability::{ControlPlaneMetrics, StructuredLogger};
use crate::state::NodeStateAggregator;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

/// Configuration for the pressure monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Scan interval
    pub check_interval: Duration,
    /// Utilization percentage above which a node is pressured (strict)
    pub pressure_threshold: f64,
    /// Migration candidates taken per pressured node per cycle
    pub max_candidates: usize,
    /// Delay between successive migrations within one cycle
    pub migration_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            pressure_threshold: 85.0,
            max_candidates: 3,
            migration_delay: Duration::from_secs(5),
        }
    }
}

/// Whether a node exceeds the pressure threshold on CPU or memory.
/// A value exactly at the threshold is not pressured.
pub fn is_pressured(state: &NodeState, threshold: f64) -> bool {
    state.cpu_used_percent() > threshold || state.mem_used_percent() > threshold
}

/// Periodic rebalancing loop
pub struct PressureMonitor {
    cluster: Arc<dyn ClusterAccessor>,
    aggregator: NodeStateAggregator,
    executor: Arc<MigrationExecutor>,
    config: MonitorConfig,
    metrics: ControlPlaneMetrics,
    logger: StructuredLogger,
}

impl PressureMonitor {
    pub fn new(
        cluster: Arc<dyn ClusterAccessor>,
        aggregator: NodeStateAggregator,
        executor: Arc<MigrationExecutor>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            cluster,
            aggregator,
            executor,
            config,
            metrics: ControlPlaneMetrics::new(),
            logger: StructuredLogger::new("pressure-monitor"),
        }
    }

    /// Run the monitor until shutdown; cycle errors are logged and the
    /// loop continues at the next tick.
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.check_interval.as_secs(),
            threshold = self.config.pressure_threshold,
            "Starting pressure monitor"
        );

        let mut ticker = interval(self.config.check_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "Pressure scan failed, retrying next interval");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down pressure monitor");
                    return;
                }
            }
        }
    }

    /// One scan: snapshot nodes, find pressure, migrate capped candidates
    async fn run_cycle(&self) -> Result<()> {
        let nodes = self.cluster.list_nodes(None).await?;
        let workers: Vec<_> = nodes
            .into_iter()
            .filter(|n| !n.labels.contains_key(CONTROL_PLANE_LABEL))
            .collect();

        let states = self.aggregator.aggregate(&workers).await;
        let pressured: Vec<&NodeState> = states
            .values()
            .filter(|s| is_pressured(s, self.config.pressure_threshold))
            .collect();
        self.metrics.set_pressured_nodes(pressured.len() as i64);

        for state in pressured {
            self.logger.log_pressure(
                &state.name,
                state.cpu_used_percent(),
                state.mem_used_percent(),
                self.config.pressure_threshold,
            );
            self.drain_node(&state.name).await?;
        }

        Ok(())
    }

    /// Migrate up to `max_candidates` eligible pods off one node
    async fn drain_node(&self, node: &str) -> Result<()> {
        let pods = self.cluster.list_pods_on_node(node).await?;

        let candidates: Vec<_> = pods
            .into_iter()
            .filter(|p| p.is_migration_candidate())
            .take(self.config.max_candidates)
            .collect();

        let mut first = true;
        for pod in candidates {
            if !first {
                tokio::time::sleep(self.config.migration_delay).await;
            }
            first = false;
            self.executor
                .migrate_pod(&pod.name, &pod.namespace, None)
                .await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::NoopCheckpointer;
    use crate::cluster::{async_trait, PodEventStream};
    use crate::migration::ExecutorConfig;
    use crate::models::{
        MigrationDecision, MigrationRecord, NodeInfo, PodInfo, ResourceRequest, RolloutStatus,
    };
    use crate::policy::PolicyClient;
    use crate::telemetry::{MigrationSink, TelemetryAccessor, TelemetryError};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    #[test]
    fn test_pressure_is_strictly_greater() {
        let mut state = NodeState {
            name: "n3".to_string(),
            cpu_allocatable: 10.0,
            mem_allocatable: 10.0e9,
            cpu_used: 8.5,
            mem_used: 0.0,
            pod_count: 0,
            battery_wh: None,
            position: None,
        };
        // Exactly at the threshold is not pressure
        assert!(!is_pressured(&state, 85.0));

        state.cpu_used = 9.0;
        assert!(is_pressured(&state, 85.0));

        state.cpu_used = 0.0;
        state.mem_used = 8.6e9;
        assert!(is_pressured(&state, 85.0));
    }

    struct FakeCluster {
        nodes: Vec<NodeInfo>,
        pods_by_node: HashMap<String, Vec<PodInfo>>,
        evictions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ClusterAccessor for FakeCluster {
        async fn list_nodes(&self, _selector: Option<&str>) -> Result<Vec<NodeInfo>> {
            Ok(self.nodes.clone())
        }

        async fn list_pods_on_node(&self, node: &str) -> Result<Vec<PodInfo>> {
            Ok(self.pods_by_node.get(node).cloned().unwrap_or_default())
        }

        async fn watch_pods(&self) -> Result<PodEventStream> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn get_pod(&self, name: &str, _ns: &str) -> Result<Option<PodInfo>> {
            for pods in self.pods_by_node.values() {
                if let Some(pod) = pods.iter().find(|p| p.name == name) {
                    return Ok(Some(pod.clone()));
                }
            }
            Ok(None)
        }

        async fn bind_pod(&self, _name: &str, _ns: &str, _node: &str) -> Result<()> {
            Ok(())
        }

        async fn patch_deployment_node_selector(
            &self,
            _name: &str,
            _ns: &str,
            _node: &str,
        ) -> Result<()> {
            Ok(())
        }

        async fn deployment_rollout(&self, _name: &str, _ns: &str) -> Result<RolloutStatus> {
            Ok(RolloutStatus::default())
        }

        async fn evict_pod(&self, name: &str, _ns: &str) -> Result<()> {
            self.evictions.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    struct NoTelemetry;

    #[async_trait]
    impl TelemetryAccessor for NoTelemetry {
        async fn latest_battery(&self, _node: &str) -> Result<Option<f64>, TelemetryError> {
            Ok(None)
        }

        async fn latest_pose(&self, _node: &str) -> Result<Option<(f64, f64)>, TelemetryError> {
            Ok(None)
        }
    }

    struct AllowAll;

    #[async_trait]
    impl PolicyClient for AllowAll {
        async fn migration_policy(
            &self,
            _pod: &PodInfo,
            _source: &str,
            _target: &str,
        ) -> Option<MigrationDecision> {
            None
        }
    }

    struct NullSink;

    #[async_trait]
    impl MigrationSink for NullSink {
        async fn record_migration(&self, _record: &MigrationRecord) -> Result<()> {
            Ok(())
        }
    }

    fn node(name: &str) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            cpu_allocatable: 10.0,
            mem_allocatable: 10.0e9,
            labels: BTreeMap::new(),
        }
    }

    fn control_plane_node(name: &str) -> NodeInfo {
        let mut info = node(name);
        info.labels
            .insert(CONTROL_PLANE_LABEL.to_string(), "".to_string());
        info
    }

    fn running_pod(name: &str, namespace: &str, node: &str, cpu: f64) -> PodInfo {
        PodInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            node_name: Some(node.to_string()),
            scheduler_name: None,
            labels: BTreeMap::new(),
            phase: Some("Running".to_string()),
            container_names: vec![],
            resource_request: ResourceRequest {
                cpu,
                memory: 0.0,
            },
            pending_deletion: false,
        }
    }

    fn monitor(cluster: Arc<FakeCluster>) -> PressureMonitor {
        let telemetry = Arc::new(NoTelemetry);
        let aggregator = NodeStateAggregator::new(cluster.clone(), telemetry.clone());
        let exec_aggregator = NodeStateAggregator::new(cluster.clone(), telemetry);
        let executor = Arc::new(MigrationExecutor::new(
            cluster.clone(),
            exec_aggregator,
            Arc::new(AllowAll),
            Arc::new(NoopCheckpointer),
            Arc::new(NullSink),
            ExecutorConfig {
                rollout_poll_interval: Duration::from_millis(1),
                rollout_timeout: Duration::from_millis(10),
                rollout_timeout_fails: false,
                evict_settle_delay: Duration::from_millis(1),
            },
        ));
        PressureMonitor::new(
            cluster,
            aggregator,
            executor,
            MonitorConfig {
                check_interval: Duration::from_secs(30),
                pressure_threshold: 85.0,
                max_candidates: 3,
                migration_delay: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn test_pressured_node_migrates_capped_candidates() {
        // n3 at 90% CPU with four eligible pods plus ineligible ones
        let pods = vec![
            running_pod("a", "default", "n3", 3.0),
            running_pod("b", "default", "n3", 3.0),
            running_pod("c", "default", "n3", 3.0),
            running_pod("d", "default", "n3", 0.0),
            running_pod("sys", "kube-system", "n3", 0.0),
        ];
        let cluster = Arc::new(FakeCluster {
            nodes: vec![node("n3"), node("n4")],
            pods_by_node: HashMap::from([("n3".to_string(), pods)]),
            evictions: Mutex::new(vec![]),
        });

        monitor(cluster.clone()).run_cycle().await.unwrap();

        // At most 3 candidates, system pods excluded
        let evictions = cluster.evictions.lock().unwrap();
        assert_eq!(evictions.as_slice(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_unpressured_cluster_migrates_nothing() {
        let cluster = Arc::new(FakeCluster {
            nodes: vec![node("n1"), node("n2")],
            pods_by_node: HashMap::from([(
                "n1".to_string(),
                vec![running_pod("a", "default", "n1", 1.0)],
            )]),
            evictions: Mutex::new(vec![]),
        });

        monitor(cluster.clone()).run_cycle().await.unwrap();

        assert!(cluster.evictions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_control_plane_nodes_are_skipped() {
        // Control-plane node over threshold must not be drained
        let pods = vec![running_pod("a", "default", "cp", 9.5)];
        let cluster = Arc::new(FakeCluster {
            nodes: vec![control_plane_node("cp"), node("n2")],
            pods_by_node: HashMap::from([("cp".to_string(), pods)]),
            evictions: Mutex::new(vec![]),
        });

        monitor(cluster.clone()).run_cycle().await.unwrap();

        assert!(cluster.evictions.lock().unwrap().is_empty());
    }
}
