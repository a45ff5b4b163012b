//! State machine for one clustered run.
//!
//! ```text
//! Idle -> Splitting -> Dispatching -> Monitoring -> Collecting -> Done
//!                          |              |
//!                          +--------------+--> CleaningUp
//! ```
//!
//! A failure while dispatching or monitoring compensates by cleaning up the
//! cluster. If that cleanup fails too, the returned error is a
//! [`ExecutionError::Cleanup`] that keeps the original failure as its cause.

use super::{ClusterExecutor, ClusterPlan, ClusterRun, Splitter};
use crate::errors::{ConfigurationError, ExecutionError, MonitorError};
use crate::injection;
use crate::remote::MonitorOutcome;
use crate::strategy::remote::require_name;
use ferry_common::variables::INTERNAL_CLUSTER_RUN_ID;
use ferry_common::{ExecutionConfiguration, PipelineDefinition, RemoteStatus, RunResult};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Splitting,
    Dispatching,
    Monitoring,
    Collecting,
    Done,
    CleaningUp,
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CoordinatorState::Idle => "idle",
            CoordinatorState::Splitting => "splitting",
            CoordinatorState::Dispatching => "dispatching",
            CoordinatorState::Monitoring => "monitoring",
            CoordinatorState::Collecting => "collecting",
            CoordinatorState::Done => "done",
            CoordinatorState::CleaningUp => "cleaning up",
        };
        write!(f, "{}", name)
    }
}

/// Tracks the current state of one run for logging.
struct Progress<'a> {
    pipeline: &'a str,
    state: CoordinatorState,
}

impl<'a> Progress<'a> {
    fn new(pipeline: &'a str) -> Self {
        Self {
            pipeline,
            state: CoordinatorState::Idle,
        }
    }

    fn enter(&mut self, next: CoordinatorState) {
        debug!(pipeline = %self.pipeline, from = %self.state, to = %next, "Cluster state change");
        self.state = next;
    }
}

pub struct ClusterCoordinator {
    splitter: Arc<dyn Splitter>,
    executor: Arc<dyn ClusterExecutor>,
    cancel: CancellationToken,
}

impl ClusterCoordinator {
    pub fn new(splitter: Arc<dyn Splitter>, executor: Arc<dyn ClusterExecutor>, cancel: CancellationToken) -> Self {
        Self {
            splitter,
            executor,
            cancel,
        }
    }

    /// Split, dispatch, wait for and collect one clustered run.
    pub async fn execute(
        &self,
        pipeline: &PipelineDefinition,
        config: &mut ExecutionConfiguration,
        arguments: &[String],
    ) -> Result<RunResult, ExecutionError> {
        require_name(pipeline)?;
        let mut progress = Progress::new(&pipeline.name);

        progress.enter(CoordinatorState::Splitting);
        let plan = self.splitter.split(pipeline).map_err(|e| ExecutionError::Split {
            pipeline: pipeline.name.clone(),
            message: format!("{:#}", e),
        })?;
        if plan.is_empty() {
            return Err(ConfigurationError::EmptyCluster {
                pipeline: pipeline.name.clone(),
            }
            .into());
        }

        let mut run = ClusterRun::new();
        config
            .variables
            .insert(INTERNAL_CLUSTER_RUN_ID.to_string(), run.id.clone());

        progress.enter(CoordinatorState::Dispatching);
        let original = plan.original_pipeline();
        injection::inject(config, original, original);
        info!(
            pipeline = %pipeline.name,
            cluster_run_id = %run.id,
            master = %plan.master.server,
            slaves = plan.cluster_size(),
            "Dispatching clustered run"
        );
        if let Err(e) = self
            .executor
            .execute_clustered(&plan, config, arguments, &mut run)
            .await
        {
            return Err(self.clean_up(&mut progress, &plan, &run, e).await);
        }

        if !(config.cluster.post && config.cluster.start) {
            progress.enter(CoordinatorState::Done);
            info!(pipeline = %pipeline.name, nodes = run.nodes.len(), "Cluster dispatched without starting");
            return Ok(RunResult::success());
        }

        progress.enter(CoordinatorState::Monitoring);
        let statuses = match self.monitor_all(&run).await {
            Ok(statuses) => statuses,
            Err(e) => return Err(self.clean_up(&mut progress, &plan, &run, e).await),
        };

        progress.enter(CoordinatorState::Collecting);
        let results: Vec<RunResult> = statuses.iter().map(RemoteStatus::run_result).collect();
        let mut result = RunResult::aggregate(&results);

        // Release worker resources and ports even after a clean run
        if let Err(e) = self.executor.cleanup_cluster(&plan, &run).await {
            warn!(pipeline = %pipeline.name, "Post-run cluster cleanup failed: {}", e);
            result.record_error();
        }

        progress.enter(CoordinatorState::Done);
        info!(
            pipeline = %pipeline.name,
            success = result.success,
            errors = result.error_count,
            "Clustered run finished"
        );
        Ok(result)
    }

    /// Wait for every node. A node that finishes with errors stops the
    /// others; a node whose monitoring fails cancels the remaining monitors.
    async fn monitor_all(&self, run: &ClusterRun) -> Result<Vec<RemoteStatus>, ExecutionError> {
        let monitors = self.cancel.child_token();
        let mut pending: FuturesUnordered<_> = run
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                let handle = self.executor.monitor(node, &monitors);
                async move { (index, handle.join().await) }
            })
            .collect();

        let mut statuses: Vec<Option<RemoteStatus>> = vec![None; run.nodes.len()];
        let mut failure: Option<ExecutionError> = None;
        let mut stopping = false;

        while let Some((index, outcome)) = pending.next().await {
            let node = &run.nodes[index];
            match outcome {
                MonitorOutcome::Completed(status) => {
                    if !status.run_result().success && !stopping {
                        error!(server = %node.server.name, run_id = %node.run_id, state = %status.state, "Cluster node failed, stopping the others");
                        stopping = true;
                        for (other_index, other) in run.nodes.iter().enumerate() {
                            if other_index == index || statuses[other_index].is_some() {
                                continue;
                            }
                            if let Err(e) = self.executor.stop_node(other).await {
                                warn!(server = %other.server.name, "Failed to stop node: {}", e);
                            }
                        }
                    }
                    statuses[index] = Some(status);
                }
                MonitorOutcome::Failed(message) => {
                    error!(server = %node.server.name, run_id = %node.run_id, "Monitoring failed: {}", message);
                    if failure.is_none() {
                        failure = Some(
                            MonitorError::Failed {
                                server: node.server.name.clone(),
                                run_id: node.run_id.clone(),
                                message,
                            }
                            .into(),
                        );
                        monitors.cancel();
                    }
                }
                MonitorOutcome::Cancelled => {
                    if failure.is_none() {
                        failure = Some(
                            MonitorError::Cancelled {
                                server: node.server.name.clone(),
                                run_id: node.run_id.clone(),
                            }
                            .into(),
                        );
                        monitors.cancel();
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(statuses.into_iter().flatten().collect()),
        }
    }

    async fn clean_up(
        &self,
        progress: &mut Progress<'_>,
        plan: &ClusterPlan,
        run: &ClusterRun,
        cause: ExecutionError,
    ) -> ExecutionError {
        progress.enter(CoordinatorState::CleaningUp);
        error!(pipeline = %progress.pipeline, "Clustered run failed: {}", cause);
        match self.executor.cleanup_cluster(plan, run).await {
            Ok(()) => cause,
            Err(cleanup) => ExecutionError::cleanup(cause, &cleanup),
        }
    }
}
