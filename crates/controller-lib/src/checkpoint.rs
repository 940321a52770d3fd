//! Checkpoint/restore capability
//!
//! The real container checkpoint mechanism (CRI-O / containerd) is an
//! external collaborator; this module only fixes the call contract. Two
//! built-in implementations exist: a simulated one that mints timestamped
//! handles without touching any runtime, and a no-op one for clusters without
//! checkpoint support. "Capability absent" (no-op) is distinct from
//! "checkpoint failed" (`None` from the simulated implementation).

use crate::models::CheckpointHandle;
use async_trait::async_trait;
use tracing::info;

/// Best-effort checkpoint capability
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Create a checkpoint for a pod; `None` when unsupported or failed
    async fn create(&self, pod_name: &str, namespace: &str) -> Option<CheckpointHandle>;

    /// Restore a checkpoint on the target node; false on failure
    async fn restore(&self, handle: &CheckpointHandle, target_node: &str) -> bool;
}

/// Checkpointer for clusters without a checkpoint mechanism
pub struct NoopCheckpointer;

#[async_trait]
impl Checkpointer for NoopCheckpointer {
    async fn create(&self, pod_name: &str, _namespace: &str) -> Option<CheckpointHandle> {
        info!(pod = %pod_name, "Checkpointing is disabled, skipping checkpoint creation");
        None
    }

    async fn restore(&self, _handle: &CheckpointHandle, _target_node: &str) -> bool {
        true
    }
}

/// Simulated checkpointer that mints handles without a real backing store
pub struct SimulatedCheckpointer;

#[async_trait]
impl Checkpointer for SimulatedCheckpointer {
    async fn create(&self, pod_name: &str, _namespace: &str) -> Option<CheckpointHandle> {
        let handle = CheckpointHandle(format!(
            "checkpoint-{}-{}",
            pod_name,
            chrono::Utc::now().timestamp()
        ));
        info!(pod = %pod_name, checkpoint = %handle.0, "Created checkpoint");
        Some(handle)
    }

    async fn restore(&self, handle: &CheckpointHandle, target_node: &str) -> bool {
        info!(checkpoint = %handle.0, node = %target_node, "Restoring checkpoint");
        true
    }
}
