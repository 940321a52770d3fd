//! Cluster access boundary
//!
//! All Kubernetes API traffic goes through the [`ClusterAccessor`] trait so
//! the control loops can be driven against in-memory fakes in tests. The
//! production implementation lives in [`kube_accessor`].

mod kube_accessor;

pub use kube_accessor::KubeCluster;

use crate::models::{NodeInfo, PodInfo, RolloutStatus};
use anyhow::Result;
use futures::stream::BoxStream;

pub use async_trait::async_trait;

/// One change observed on the cluster's pod set
#[derive(Debug, Clone)]
pub enum PodEvent {
    /// Pod created or modified
    Applied(PodInfo),
    /// Pod removed
    Deleted(PodInfo),
}

/// Stream of pod change events; each item may be a stream-level error that
/// terminates the current watch
pub type PodEventStream = BoxStream<'static, Result<PodEvent>>;

/// Accessor for the cluster API server
#[async_trait]
pub trait ClusterAccessor: Send + Sync {
    /// List nodes, optionally restricted by a label selector
    async fn list_nodes(&self, label_selector: Option<&str>) -> Result<Vec<NodeInfo>>;

    /// List pods currently bound to the given node
    async fn list_pods_on_node(&self, node: &str) -> Result<Vec<PodInfo>>;

    /// Open a watch over all pods in the cluster
    async fn watch_pods(&self) -> Result<PodEventStream>;

    /// Fetch one pod, `None` when it does not exist
    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Option<PodInfo>>;

    /// Bind an unscheduled pod to a node
    async fn bind_pod(&self, name: &str, namespace: &str, node: &str) -> Result<()>;

    /// Pin a deployment's pod template to a node via its node selector
    async fn patch_deployment_node_selector(
        &self,
        name: &str,
        namespace: &str,
        node: &str,
    ) -> Result<()>;

    /// Read a deployment's rollout progress
    async fn deployment_rollout(&self, name: &str, namespace: &str) -> Result<RolloutStatus>;

    /// Evict a single pod through the eviction subresource
    async fn evict_pod(&self, name: &str, namespace: &str) -> Result<()>;
}
