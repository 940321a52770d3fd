//! Migration control loop
//!
//! The pressure monitor periodically scans node resource usage and hands
//! pods on pressured nodes to the executor, which consults the policy
//! engine, takes a best-effort checkpoint and relocates the pod either by
//! repinning its owning workload or by evicting it directly.

mod executor;
mod monitor;
mod selector;
mod workload;

pub use executor::{ExecutorConfig, MigrationExecutor};
pub use monitor::{is_pressured, MonitorConfig, PressureMonitor};
pub use selector::find_target_node;
pub use workload::{label_heuristic, WorkloadDetector};

/// Label marking nodes that never receive migrated pods
pub const CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";
