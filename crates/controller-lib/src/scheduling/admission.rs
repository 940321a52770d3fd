//! Admission loop
//!
//! Event-driven state machine over the cluster's pod watch:
//! WATCHING -> POD_DETECTED -> NODE_SELECTED -> BOUND -> WATCHING.
//! Only pods requesting this scheduler's identity are considered; bind
//! errors are swallowed and retried through the watch's own redelivery.
//! The watch stream itself is wrapped in a restart loop: any stream error
//! tears the watch down and a fresh one is established after a fixed delay.

use crate::cluster::{ClusterAccessor, PodEvent};
use crate::models::PodInfo;
use crate::observability::{ControlPlaneMetrics, StructuredLogger};
use crate::scheduling::choose_node;
use crate::state::NodeStateAggregator;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Configuration for the admission loop
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Scheduler identity pods must request to be handled here
    pub scheduler_name: String,
    /// Label selector restricting eligible worker nodes
    pub node_label_selector: String,
    /// Delay before re-establishing a failed watch stream
    pub restart_delay: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            scheduler_name: "sdi-scheduler".to_string(),
            node_label_selector: "kubernetes.io/arch=arm64".to_string(),
            restart_delay: Duration::from_secs(5),
        }
    }
}

/// Admission loop binding unscheduled pods via the MALE policy
pub struct AdmissionLoop {
    cluster: Arc<dyn ClusterAccessor>,
    aggregator: NodeStateAggregator,
    config: AdmissionConfig,
    metrics: ControlPlaneMetrics,
    logger: StructuredLogger,
}

impl AdmissionLoop {
    pub fn new(
        cluster: Arc<dyn ClusterAccessor>,
        aggregator: NodeStateAggregator,
        config: AdmissionConfig,
    ) -> Self {
        let logger = StructuredLogger::new(&config.scheduler_name);
        Self {
            cluster,
            aggregator,
            config,
            metrics: ControlPlaneMetrics::new(),
            logger,
        }
    }

    /// Run the admission loop until shutdown.
    ///
    /// Restarts the watch stream indefinitely on failure; each restart drops
    /// the previous stream before opening a new one, so no watch leaks.
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            scheduler = %self.config.scheduler_name,
            selector = %self.config.node_label_selector,
            "Starting admission loop"
        );

        loop {
            tokio::select! {
                outcome = self.watch_once() => {
                    if let Err(e) = outcome {
                        error!(error = %e, "Pod watch terminated, restarting");
                    }
                    self.metrics.inc_watch_restarts();
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.restart_delay) => {}
                        _ = shutdown.recv() => {
                            info!("Shutting down admission loop");
                            return;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down admission loop");
                    return;
                }
            }
        }
    }

    /// Consume one watch stream until it errors or ends
    async fn watch_once(&self) -> anyhow::Result<()> {
        let mut stream = self.cluster.watch_pods().await?;

        while let Some(event) = stream.next().await {
            match event? {
                PodEvent::Applied(pod) => self.handle_pod(&pod).await,
                // Deletions never need placement
                PodEvent::Deleted(_) => {}
            }
        }

        anyhow::bail!("pod watch stream ended")
    }

    /// Process one pod change event
    async fn handle_pod(&self, pod: &PodInfo) {
        if pod.pending_deletion {
            return;
        }
        if pod.scheduler_name.as_deref() != Some(self.config.scheduler_name.as_str()) {
            return;
        }
        if pod.node_name.is_some() {
            return;
        }

        info!(
            pod = %pod.name,
            namespace = %pod.namespace,
            "Workload detected, scheduling"
        );
        let start = Instant::now();

        let nodes = match self
            .cluster
            .list_nodes(Some(&self.config.node_label_selector))
            .await
        {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "Worker listing failed, cycle skipped");
                return;
            }
        };
        if nodes.is_empty() {
            error!(
                selector = %self.config.node_label_selector,
                "No eligible workers, pod cannot be scheduled"
            );
            return;
        }
        debug!(workers = nodes.len(), "Eligible workers found");

        let states = self.aggregator.aggregate(&nodes).await;
        let Some(choice) = choose_node(&states, &nodes) else {
            error!(pod = %pod.name, "No node selectable, cycle skipped");
            return;
        };
        let battery = states.get(&choice).and_then(|s| s.battery_wh);
        info!(node = %choice, "MALE policy selected node");

        match self.cluster.bind_pod(&pod.name, &pod.namespace, &choice).await {
            Ok(()) => {
                self.metrics.inc_pods_bound();
                self.metrics
                    .observe_scheduling_latency(start.elapsed().as_secs_f64());
                self.logger.log_bind(&pod.name, &pod.namespace, &choice, battery);
            }
            Err(e) => {
                // Pod stays unscheduled; the watch will redeliver it
                self.metrics.inc_bind_errors();
                self.logger
                    .log_bind_failure(&pod.name, &pod.namespace, &choice, &e.to_string());
            }
        }
    }
}
