//! Per-cycle node state aggregation
//!
//! Builds the node -> {capacity, used, battery, position} map that both the
//! admission loop and the pressure monitor decide on. The aggregation is
//! best-effort: a telemetry failure leaves one node's battery/pose absent,
//! a pod-listing failure drops that node's entry entirely; neither aborts
//! the batch.

use crate::cluster::ClusterAccessor;
use crate::models::{NodeInfo, NodeState};
use crate::telemetry::TelemetryAccessor;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds best-effort node state snapshots
pub struct NodeStateAggregator {
    cluster: Arc<dyn ClusterAccessor>,
    telemetry: Arc<dyn TelemetryAccessor>,
}

impl NodeStateAggregator {
    pub fn new(cluster: Arc<dyn ClusterAccessor>, telemetry: Arc<dyn TelemetryAccessor>) -> Self {
        Self { cluster, telemetry }
    }

    /// Snapshot the given candidate nodes.
    ///
    /// Resource usage is recomputed from scratch out of the current pod
    /// requests, never accumulated across cycles. Output is keyed by node
    /// name in sorted order so downstream tie-breaks are deterministic.
    pub async fn aggregate(&self, nodes: &[NodeInfo]) -> BTreeMap<String, NodeState> {
        let mut states = BTreeMap::new();

        for node in nodes {
            let pods = match self.cluster.list_pods_on_node(&node.name).await {
                Ok(pods) => pods,
                Err(e) => {
                    warn!(node = %node.name, error = %e, "Resource listing failed, node excluded from snapshot");
                    continue;
                }
            };

            let mut cpu_used = 0.0;
            let mut mem_used = 0.0;
            for pod in &pods {
                cpu_used += pod.resource_request.cpu;
                mem_used += pod.resource_request.memory;
            }

            let battery_wh = match self.telemetry.latest_battery(&node.name).await {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(node = %node.name, error = %e, "Battery query failed, node degraded");
                    None
                }
            };
            let position = match self.telemetry.latest_pose(&node.name).await {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(node = %node.name, error = %e, "Pose query failed, node degraded");
                    None
                }
            };

            states.insert(
                node.name.clone(),
                NodeState {
                    name: node.name.clone(),
                    cpu_allocatable: node.cpu_allocatable,
                    mem_allocatable: node.mem_allocatable,
                    cpu_used,
                    mem_used,
                    pod_count: pods.len(),
                    battery_wh,
                    position,
                },
            );
        }

        debug!(
            nodes = states.len(),
            table = %state_table(&states),
            "Node state snapshot complete"
        );
        states
    }
}

/// Compact JSON dump of the snapshot for debug logs
fn state_table(states: &BTreeMap<String, NodeState>) -> String {
    serde_json::to_string(states).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{async_trait, PodEventStream};
    use crate::models::{PodInfo, ResourceRequest, RolloutStatus};
    use crate::telemetry::TelemetryError;
    use anyhow::Result;
    use std::collections::HashMap;

    struct FakeCluster {
        pods_by_node: HashMap<String, Vec<PodInfo>>,
        failing_nodes: Vec<String>,
    }

    #[async_trait]
    impl ClusterAccessor for FakeCluster {
        async fn list_nodes(&self, _selector: Option<&str>) -> Result<Vec<NodeInfo>> {
            Ok(vec![])
        }

        async fn list_pods_on_node(&self, node: &str) -> Result<Vec<PodInfo>> {
            if self.failing_nodes.iter().any(|n| n == node) {
                anyhow::bail!("api error");
            }
            Ok(self.pods_by_node.get(node).cloned().unwrap_or_default())
        }

        async fn watch_pods(&self) -> Result<PodEventStream> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn get_pod(&self, _name: &str, _ns: &str) -> Result<Option<PodInfo>> {
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

        async fn evict_pod(&self, _name: &str, _ns: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FakeTelemetry {
        battery: HashMap<String, f64>,
        failing: bool,
    }

    #[async_trait]
    impl TelemetryAccessor for FakeTelemetry {
        async fn latest_battery(&self, node: &str) -> Result<Option<f64>, TelemetryError> {
            if self.failing {
                return Err(TelemetryError::Decode("boom".to_string()));
            }
            Ok(self.battery.get(node).copied())
        }

        async fn latest_pose(&self, _node: &str) -> Result<Option<(f64, f64)>, TelemetryError> {
            if self.failing {
                return Err(TelemetryError::Decode("boom".to_string()));
            }
            Ok(Some((0.0, 1.0)))
        }
    }

    fn node(name: &str) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            cpu_allocatable: 4.0,
            mem_allocatable: 8.0e9,
            labels: Default::default(),
        }
    }

    fn pod_with_request(cpu: f64, memory: f64) -> PodInfo {
        PodInfo {
            name: "p".to_string(),
            namespace: "default".to_string(),
            node_name: None,
            scheduler_name: None,
            labels: Default::default(),
            phase: Some("Running".to_string()),
            container_names: vec![],
            resource_request: ResourceRequest { cpu, memory },
            pending_deletion: false,
        }
    }

    #[tokio::test]
    async fn test_usage_summed_from_pod_requests() {
        let mut pods_by_node = HashMap::new();
        pods_by_node.insert(
            "tb-01".to_string(),
            vec![pod_with_request(0.5, 1.0e9), pod_with_request(0.25, 0.5e9)],
        );

        let aggregator = NodeStateAggregator::new(
            Arc::new(FakeCluster {
                pods_by_node,
                failing_nodes: vec![],
            }),
            Arc::new(FakeTelemetry {
                battery: HashMap::from([("tb-01".to_string(), 37.0)]),
                failing: false,
            }),
        );

        let states = aggregator.aggregate(&[node("tb-01")]).await;
        let state = &states["tb-01"];
        assert!((state.cpu_used - 0.75).abs() < 1e-9);
        assert!((state.mem_used - 1.5e9).abs() < 1e-3);
        assert_eq!(state.pod_count, 2);
        assert_eq!(state.battery_wh, Some(37.0));
        assert_eq!(state.position, Some((0.0, 1.0)));
    }

    #[tokio::test]
    async fn test_telemetry_failure_degrades_node() {
        let mut pods_by_node = HashMap::new();
        pods_by_node.insert("tb-01".to_string(), vec![]);

        let aggregator = NodeStateAggregator::new(
            Arc::new(FakeCluster {
                pods_by_node,
                failing_nodes: vec![],
            }),
            Arc::new(FakeTelemetry {
                battery: HashMap::new(),
                failing: true,
            }),
        );

        let states = aggregator.aggregate(&[node("tb-01")]).await;
        let state = &states["tb-01"];
        assert!(state.battery_wh.is_none());
        assert!(state.position.is_none());
    }

    #[tokio::test]
    async fn test_listing_failure_excludes_node_only() {
        let mut pods_by_node = HashMap::new();
        pods_by_node.insert("tb-02".to_string(), vec![pod_with_request(0.1, 1.0e8)]);

        let aggregator = NodeStateAggregator::new(
            Arc::new(FakeCluster {
                pods_by_node,
                failing_nodes: vec!["tb-01".to_string()],
            }),
            Arc::new(FakeTelemetry {
                battery: HashMap::new(),
                failing: false,
            }),
        );

        let states = aggregator.aggregate(&[node("tb-01"), node("tb-02")]).await;
        assert!(!states.contains_key("tb-01"));
        assert!(states.contains_key("tb-02"));
    }
}
