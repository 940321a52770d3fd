//! Migration executor
//!
//! Orchestrates the relocation of one pod: resolve -> detect workload ->
//! pick destination -> policy check -> checkpoint -> relocate -> restore ->
//! record. Every attempt emits exactly one migration record; any error in
//! the sequence is caught, logged and recorded as a failed migration rather
//! than propagated to the calling loop.

use super::{find_target_node, workload, WorkloadDetector, CONTROL_PLANE_LABEL};
use crate::checkpoint::Checkpointer;
use crate::cluster::ClusterAccessor;
use crate::models::{MigrationRecord, PodInfo};
use crate::observability::{ControlPlaneMetrics, StructuredLogger};
use crate::policy::PolicyClient;
use crate::state::NodeStateAggregator;
use crate::telemetry::MigrationSink;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Timing knobs for the relocation steps
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Poll interval while waiting for a deployment rollout
    pub rollout_poll_interval: Duration,
    /// Upper bound on the rollout wait
    pub rollout_timeout: Duration,
    /// When true a rollout timeout fails the migration. The default treats
    /// a timed-out rollout as success: slow image pulls on constrained
    /// robots routinely outlive the wait while the relocation itself lands.
    pub rollout_timeout_fails: bool,
    /// Settle delay after evicting a bare pod
    pub evict_settle_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            rollout_poll_interval: Duration::from_secs(2),
            rollout_timeout: Duration::from_secs(300),
            rollout_timeout_fails: false,
            evict_settle_delay: Duration::from_secs(5),
        }
    }
}

/// Executes single-pod migrations
pub struct MigrationExecutor {
    cluster: Arc<dyn ClusterAccessor>,
    aggregator: NodeStateAggregator,
    policy: Arc<dyn PolicyClient>,
    checkpointer: Arc<dyn Checkpointer>,
    sink: Arc<dyn MigrationSink>,
    detector: WorkloadDetector,
    config: ExecutorConfig,
    metrics: ControlPlaneMetrics,
    logger: StructuredLogger,
}

impl MigrationExecutor {
    pub fn new(
        cluster: Arc<dyn ClusterAccessor>,
        aggregator: NodeStateAggregator,
        policy: Arc<dyn PolicyClient>,
        checkpointer: Arc<dyn Checkpointer>,
        sink: Arc<dyn MigrationSink>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            cluster,
            aggregator,
            policy,
            checkpointer,
            sink,
            detector: workload::default_detector(),
            config,
            metrics: ControlPlaneMetrics::new(),
            logger: StructuredLogger::new("migration-executor"),
        }
    }

    /// Replace the workload detection strategy
    pub fn with_detector(mut self, detector: WorkloadDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Relocate one pod, optionally to a caller-chosen destination.
    ///
    /// Returns whether the migration succeeded. Always records one
    /// migration metric; never propagates errors.
    pub async fn migrate_pod(
        &self,
        pod_name: &str,
        namespace: &str,
        requested_target: Option<&str>,
    ) -> bool {
        let started = Instant::now();
        let mut source_node = "unknown".to_string();
        let mut target_node = requested_target.unwrap_or("unknown").to_string();

        let outcome = self
            .run_migration(
                pod_name,
                namespace,
                requested_target,
                &mut source_node,
                &mut target_node,
            )
            .await;

        let (success, detail) = match outcome {
            Ok(()) => (true, String::new()),
            Err(e) => {
                warn!(pod = %pod_name, error = %e, "Migration aborted");
                (false, format!("{e:#}"))
            }
        };

        self.metrics
            .observe_migration_duration(started.elapsed().as_secs_f64());
        self.metrics.inc_migrations(success);
        self.logger
            .log_migration(pod_name, &source_node, &target_node, success, &detail);

        let record = MigrationRecord::new(pod_name, &source_node, &target_node, success);
        if let Err(e) = self.sink.record_migration(&record).await {
            // Metrics are best-effort and never fail a migration
            warn!(pod = %pod_name, error = %e, "Failed to record migration metric");
        }

        success
    }

    async fn run_migration(
        &self,
        pod_name: &str,
        namespace: &str,
        requested_target: Option<&str>,
        source_node: &mut String,
        target_node: &mut String,
    ) -> Result<()> {
        let pod = self
            .cluster
            .get_pod(pod_name, namespace)
            .await?
            .with_context(|| format!("Pod {namespace}/{pod_name} not found"))?;

        if let Some(node) = &pod.node_name {
            *source_node = node.clone();
        }
        let workload_name = (self.detector)(&pod.labels);

        let target = match requested_target {
            Some(target) => target.to_string(),
            None => self
                .select_target(&pod, source_node)
                .await?
                .with_context(|| format!("No suitable target node for pod {pod_name}"))?,
        };
        *target_node = target.clone();

        info!(
            pod = %pod_name,
            source = %source_node,
            target = %target,
            workload = ?workload_name,
            "Migrating pod"
        );

        self.check_policy(&pod, source_node, &target).await?;

        let checkpoint = self.checkpointer.create(pod_name, namespace).await;

        match workload_name {
            Some(workload) => {
                self.cluster
                    .patch_deployment_node_selector(&workload, namespace, &target)
                    .await?;
                info!(deployment = %workload, target = %target, "Deployment repinned");

                self.wait_for_rollout(&workload, namespace).await?;

                if let Some(handle) = checkpoint {
                    if !self.checkpointer.restore(&handle, &target).await {
                        warn!(checkpoint = %handle.0, "Checkpoint restore failed");
                    }
                }
            }
            None => {
                // Bare pod: evict and let the cluster scheduler resettle it.
                // There is no confirmation the replacement lands on `target`.
                self.cluster.evict_pod(pod_name, namespace).await?;
                info!(pod = %pod_name, "Evicted pod, waiting for reschedule");
                tokio::time::sleep(self.config.evict_settle_delay).await;
            }
        }

        Ok(())
    }

    /// Compute the destination from cluster-wide headroom
    async fn select_target(&self, pod: &PodInfo, source_node: &str) -> Result<Option<String>> {
        let nodes = self.cluster.list_nodes(None).await?;
        let workers: Vec<_> = nodes
            .into_iter()
            .filter(|n| !n.labels.contains_key(CONTROL_PLANE_LABEL))
            .collect();

        let states = self.aggregator.aggregate(&workers).await;
        Ok(find_target_node(&states, source_node, pod.resource_request))
    }

    /// Consult the policy engine; an explicit denial aborts the migration
    async fn check_policy(&self, pod: &PodInfo, source: &str, target: &str) -> Result<()> {
        match self.policy.migration_policy(pod, source, target).await {
            Some(decision) if !decision.allowed => {
                bail!("Migration not allowed by policy engine: {}", decision.reason);
            }
            Some(_) => Ok(()),
            None if self.policy.fail_open() => {
                warn!(pod = %pod.name, "Policy engine gave no opinion, proceeding (fail-open)");
                Ok(())
            }
            None => bail!("Policy engine unreachable and fail-open is disabled"),
        }
    }

    /// Poll rollout status until complete or timed out
    async fn wait_for_rollout(&self, workload: &str, namespace: &str) -> Result<()> {
        let deadline = Instant::now() + self.config.rollout_timeout;

        while Instant::now() < deadline {
            let status = self
                .cluster
                .deployment_rollout(workload, namespace)
                .await?;
            if status.is_complete() {
                info!(deployment = %workload, "Rollout completed");
                return Ok(());
            }
            tokio::time::sleep(self.config.rollout_poll_interval).await;
        }

        warn!(deployment = %workload, "Rollout timed out");
        if self.config.rollout_timeout_fails {
            bail!("Deployment {workload} rollout timed out");
        }
        Ok(())
    }
}
