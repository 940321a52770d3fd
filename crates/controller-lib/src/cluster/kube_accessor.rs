//! Kubernetes implementation of the cluster accessor
//!
//! Thin projection layer over kube-rs: API objects are flattened into the
//! control plane's own models at the boundary so nothing downstream handles
//! raw Kubernetes types.

use super::{ClusterAccessor, PodEvent, PodEventStream};
use crate::models::{NodeInfo, PodInfo, ResourceRequest, RolloutStatus};
use crate::resources::parse_requests;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Binding, Node, ObjectReference, Pod};
use kube::api::{Api, EvictParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::runtime::watcher;
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

/// Cluster accessor backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods_all(&self) -> Api<Pod> {
        Api::all(self.client.clone())
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Flatten a node object into the accessor's projection
fn project_node(node: &Node) -> NodeInfo {
    let name = node.metadata.name.clone().unwrap_or_default();
    let allocatable = node
        .status
        .as_ref()
        .and_then(|s| s.allocatable.as_ref());

    let quantity = |key: &str| -> f64 {
        allocatable
            .and_then(|map| map.get(key))
            .map(|q| crate::resources::parse_quantity(&q.0))
            .unwrap_or(0.0)
    };

    NodeInfo {
        name,
        cpu_allocatable: quantity("cpu"),
        mem_allocatable: quantity("memory"),
        labels: node.metadata.labels.clone().unwrap_or_default(),
    }
}

/// Flatten a pod object into the accessor's projection
fn project_pod(pod: &Pod) -> PodInfo {
    let spec = pod.spec.as_ref();

    let mut request = ResourceRequest::default();
    let mut container_names = Vec::new();
    if let Some(spec) = spec {
        for container in &spec.containers {
            container_names.push(container.name.clone());
            if let Some(requests) = container
                .resources
                .as_ref()
                .and_then(|r| r.requests.as_ref())
            {
                let normalized: BTreeMap<String, String> = requests
                    .iter()
                    .map(|(k, v)| (k.clone(), v.0.clone()))
                    .collect();
                request.add(parse_requests(&normalized));
            }
        }
    }

    PodInfo {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        node_name: spec.and_then(|s| s.node_name.clone()),
        scheduler_name: spec.and_then(|s| s.scheduler_name.clone()),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
        container_names,
        resource_request: request,
        pending_deletion: pod.metadata.deletion_timestamp.is_some(),
    }
}

#[async_trait]
impl ClusterAccessor for KubeCluster {
    async fn list_nodes(&self, label_selector: Option<&str>) -> Result<Vec<NodeInfo>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = nodes.list(&params).await.context("Failed to list nodes")?;
        Ok(list.items.iter().map(project_node).collect())
    }

    async fn list_pods_on_node(&self, node: &str) -> Result<Vec<PodInfo>> {
        let params = ListParams::default().fields(&format!("spec.nodeName={node}"));
        let list = self
            .pods_all()
            .list(&params)
            .await
            .with_context(|| format!("Failed to list pods on node {node}"))?;
        Ok(list.items.iter().map(project_pod).collect())
    }

    async fn watch_pods(&self) -> Result<PodEventStream> {
        let stream = watcher(self.pods_all(), watcher::Config::default())
            .flat_map(|event| {
                let mapped: Vec<Result<PodEvent>> = match event {
                    Ok(watcher::Event::Applied(pod)) => {
                        vec![Ok(PodEvent::Applied(project_pod(&pod)))]
                    }
                    Ok(watcher::Event::Deleted(pod)) => {
                        vec![Ok(PodEvent::Deleted(project_pod(&pod)))]
                    }
                    // A restart re-lists the world; replay as applied events
                    // so unbound pods are retried without an explicit queue.
                    Ok(watcher::Event::Restarted(pods)) => pods
                        .iter()
                        .map(|pod| Ok(PodEvent::Applied(project_pod(pod))))
                        .collect(),
                    Err(e) => vec![Err(anyhow::Error::new(e).context("Pod watch failed"))],
                };
                futures::stream::iter(mapped)
            })
            .boxed();
        Ok(stream)
    }

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Option<PodInfo>> {
        match self.pods(namespace).get_opt(name).await {
            Ok(pod) => Ok(pod.as_ref().map(project_pod)),
            Err(e) => Err(anyhow::Error::new(e))
                .with_context(|| format!("Failed to get pod {namespace}/{name}")),
        }
    }

    async fn bind_pod(&self, name: &str, namespace: &str, node: &str) -> Result<()> {
        let binding = Binding {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            target: ObjectReference {
                api_version: Some("v1".to_string()),
                kind: Some("Node".to_string()),
                name: Some(node.to_string()),
                ..Default::default()
            },
        };
        let data = serde_json::to_vec(&binding).context("Failed to serialize binding")?;

        self.pods(namespace)
            .create_subresource::<Binding>("binding", name, &PostParams::default(), data)
            .await
            .with_context(|| format!("Failed to bind pod {namespace}/{name} to {node}"))?;

        debug!(pod = %name, namespace = %namespace, node = %node, "Bind request accepted");
        Ok(())
    }

    async fn patch_deployment_node_selector(
        &self,
        name: &str,
        namespace: &str,
        node: &str,
    ) -> Result<()> {
        let patch = serde_json::json!({
            "spec": {
                "template": {
                    "spec": {
                        "nodeSelector": { "kubernetes.io/hostname": node }
                    }
                }
            }
        });

        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("Failed to patch deployment {namespace}/{name}"))?;
        Ok(())
    }

    async fn deployment_rollout(&self, name: &str, namespace: &str) -> Result<RolloutStatus> {
        let deployment = self
            .deployments(namespace)
            .get(name)
            .await
            .with_context(|| format!("Failed to get deployment {namespace}/{name}"))?;

        let desired = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        let status = deployment.status.as_ref();

        Ok(RolloutStatus {
            desired_replicas: desired,
            updated_replicas: status.and_then(|s| s.updated_replicas).unwrap_or(0),
            ready_replicas: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        })
    }

    async fn evict_pod(&self, name: &str, namespace: &str) -> Result<()> {
        self.pods(namespace)
            .evict(name, &EvictParams::default())
            .await
            .with_context(|| format!("Failed to evict pod {namespace}/{name}"))?;
        Ok(())
    }
}
