//! Core data models for the fleet control plane

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-cycle snapshot of a node's capacity, usage and robot telemetry.
///
/// Derived from scratch on every cycle and never persisted; a snapshot of a
/// moving cluster is expected to be slightly stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub name: String,
    /// Allocatable CPU in cores
    pub cpu_allocatable: f64,
    /// Allocatable memory in bytes
    pub mem_allocatable: f64,
    /// Sum of CPU requests of pods bound to the node, in cores
    pub cpu_used: f64,
    /// Sum of memory requests of pods bound to the node, in bytes
    pub mem_used: f64,
    pub pod_count: usize,
    /// Latest battery energy sample in watt-hours, if the robot reported one
    /// within the lookback window
    pub battery_wh: Option<f64>,
    /// Latest (x, y) pose sample, if available
    pub position: Option<(f64, f64)>,
}

impl NodeState {
    /// CPU usage as a percentage of allocatable, 0 when allocatable is unknown
    pub fn cpu_used_percent(&self) -> f64 {
        if self.cpu_allocatable > 0.0 {
            self.cpu_used / self.cpu_allocatable * 100.0
        } else {
            0.0
        }
    }

    /// Memory usage as a percentage of allocatable, 0 when allocatable is unknown
    pub fn mem_used_percent(&self) -> f64 {
        if self.mem_allocatable > 0.0 {
            self.mem_used / self.mem_allocatable * 100.0
        } else {
            0.0
        }
    }
}

/// Allocatable resources of a worker node as reported by the cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub cpu_allocatable: f64,
    pub mem_allocatable: f64,
    pub labels: BTreeMap<String, String>,
}

/// Read-only projection of a pod as seen through the cluster API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub node_name: Option<String>,
    pub scheduler_name: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub phase: Option<String>,
    pub container_names: Vec<String>,
    /// Sum of the pod's declared container requests
    pub resource_request: ResourceRequest,
    /// True when a deletion timestamp is set on the pod
    pub pending_deletion: bool,
}

impl PodInfo {
    /// Whether the pod may be relocated: running or pending, and not in the
    /// cluster-system namespace.
    pub fn is_migration_candidate(&self) -> bool {
        if self.namespace == "kube-system" {
            return false;
        }
        matches!(self.phase.as_deref(), Some("Running") | Some("Pending"))
    }
}

/// Normalized resource requirements (cores, bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cpu: f64,
    pub memory: f64,
}

impl ResourceRequest {
    pub fn add(&mut self, other: ResourceRequest) {
        self.cpu += other.cpu;
        self.memory += other.memory;
    }
}

/// Verdict from the external policy engine for one relocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationDecision {
    #[serde(default = "default_allowed")]
    pub allowed: bool,
    #[serde(default)]
    pub reason: String,
}

// A response that omits `allowed` counts as permission. The engine is
// advisory and fail-open; see PolicyEngineClient for the flip switch.
fn default_allowed() -> bool {
    true
}

/// Immutable record of one migration attempt, emitted to the telemetry store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub pod_name: String,
    pub source_node: String,
    pub target_node: String,
    pub success: bool,
    /// Nanoseconds since the Unix epoch
    pub timestamp_ns: i64,
}

impl MigrationRecord {
    pub fn new(pod_name: &str, source_node: &str, target_node: &str, success: bool) -> Self {
        Self {
            pod_name: pod_name.to_string(),
            source_node: source_node.to_string(),
            target_node: target_node.to_string(),
            success,
            timestamp_ns: chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default(),
        }
    }
}

/// Opaque identifier returned by the checkpoint capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointHandle(pub String);

/// Observed readiness of a deployment rollout
#[derive(Debug, Clone, Copy, Default)]
pub struct RolloutStatus {
    pub desired_replicas: i32,
    pub updated_replicas: i32,
    pub ready_replicas: i32,
}

impl RolloutStatus {
    /// Rollout is complete once updated and ready both match desired
    pub fn is_complete(&self) -> bool {
        self.updated_replicas == self.desired_replicas
            && self.ready_replicas == self.desired_replicas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(namespace: &str, phase: Option<&str>) -> PodInfo {
        PodInfo {
            name: "p".to_string(),
            namespace: namespace.to_string(),
            node_name: Some("n1".to_string()),
            scheduler_name: None,
            labels: BTreeMap::new(),
            phase: phase.map(String::from),
            container_names: vec![],
            resource_request: ResourceRequest::default(),
            pending_deletion: false,
        }
    }

    #[test]
    fn test_migration_candidate_filter() {
        assert!(pod("default", Some("Running")).is_migration_candidate());
        assert!(pod("default", Some("Pending")).is_migration_candidate());
        assert!(!pod("default", Some("Succeeded")).is_migration_candidate());
        assert!(!pod("default", None).is_migration_candidate());
        assert!(!pod("kube-system", Some("Running")).is_migration_candidate());
    }

    #[test]
    fn test_decision_defaults_to_allowed() {
        // A response body without an explicit `allowed` field is permission
        let decision: MigrationDecision = serde_json::from_str("{}").unwrap();
        assert!(decision.allowed);
        assert!(decision.reason.is_empty());

        let denied: MigrationDecision =
            serde_json::from_str(r#"{"allowed": false, "reason": "battery low"}"#).unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.reason, "battery low");
    }

    #[test]
    fn test_node_state_percentages() {
        let state = NodeState {
            name: "n1".to_string(),
            cpu_allocatable: 4.0,
            mem_allocatable: 8.0 * 1024.0 * 1024.0 * 1024.0,
            cpu_used: 1.0,
            mem_used: 2.0 * 1024.0 * 1024.0 * 1024.0,
            pod_count: 3,
            battery_wh: None,
            position: None,
        };
        assert!((state.cpu_used_percent() - 25.0).abs() < f64::EPSILON);
        assert!((state.mem_used_percent() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rollout_status_complete() {
        let status = RolloutStatus {
            desired_replicas: 2,
            updated_replicas: 2,
            ready_replicas: 2,
        };
        assert!(status.is_complete());

        let partial = RolloutStatus {
            desired_replicas: 2,
            updated_replicas: 2,
            ready_replicas: 1,
        };
        assert!(!partial.is_complete());
    }
}
