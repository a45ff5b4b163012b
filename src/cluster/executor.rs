//! Per-node mechanics of a clustered run.

use super::{ClusterPlan, ClusterRun, DispatchedNode, NodeAssignment};
use crate::errors::ExecutionError;
use crate::remote::{MonitorHandle, RemoteMonitor, RemoteTransport};
use async_trait::async_trait;
use ferry_common::variables::{
    INTERNAL_CLUSTER_MASTER, INTERNAL_CLUSTER_SIZE, INTERNAL_SLAVE_SERVER_NAME,
    INTERNAL_SLAVE_SERVER_NUMBER,
};
use ferry_common::{ExecutionConfiguration, RunSubmission};
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives the nodes of a [`ClusterPlan`].
#[async_trait]
pub trait ClusterExecutor: Send + Sync {
    /// Post, prepare and start the plan's sub-pipelines as `config.cluster`
    /// asks. Every node the workers accept is recorded in `run`, even when a
    /// later node fails.
    async fn execute_clustered(
        &self,
        plan: &ClusterPlan,
        config: &ExecutionConfiguration,
        arguments: &[String],
        run: &mut ClusterRun,
    ) -> Result<(), ExecutionError>;

    /// Start watching one dispatched node.
    fn monitor(&self, node: &DispatchedNode, cancel: &CancellationToken) -> MonitorHandle;

    async fn stop_node(&self, node: &DispatchedNode) -> Result<(), ExecutionError>;

    /// Release everything the cluster holds: every dispatched node's run,
    /// then the master's port allocations for the pipeline when the master
    /// had work.
    async fn cleanup_cluster(&self, plan: &ClusterPlan, run: &ClusterRun) -> Result<(), ExecutionError>;
}

/// [`ClusterExecutor`] over a [`RemoteTransport`].
pub struct RemoteClusterExecutor {
    transport: Arc<dyn RemoteTransport>,
    monitor: RemoteMonitor,
}

impl RemoteClusterExecutor {
    pub fn new(transport: Arc<dyn RemoteTransport>, monitor: RemoteMonitor) -> Self {
        Self { transport, monitor }
    }

    async fn post(
        &self,
        node: &NodeAssignment,
        submission: RunSubmission,
        master: bool,
    ) -> Result<DispatchedNode, ExecutionError> {
        let run_id = self
            .transport
            .register(&node.server, &submission)
            .await
            .map_err(|e| ExecutionError::dispatch(&node.server.name, &e))?;
        debug!(server = %node.server.name, run_id = %run_id, master, "Sub-pipeline posted");
        Ok(DispatchedNode {
            server: node.server.clone(),
            run_id,
            pipeline_name: node.pipeline.name.clone(),
            master,
        })
    }
}

/// A node's own copy of the configuration with its cluster variables set.
fn node_config(config: &ExecutionConfiguration, plan: &ClusterPlan, slave_index: Option<usize>) -> ExecutionConfiguration {
    let mut config = config.clone();
    let vars = &mut config.variables;
    vars.insert(INTERNAL_CLUSTER_SIZE.to_string(), plan.cluster_size().to_string());
    match slave_index {
        None => {
            vars.insert(INTERNAL_CLUSTER_MASTER.to_string(), "Y".to_string());
        }
        Some(index) => {
            vars.insert(INTERNAL_SLAVE_SERVER_NUMBER.to_string(), index.to_string());
            vars.insert(INTERNAL_SLAVE_SERVER_NAME.to_string(), plan.slaves[index].server.name.clone());
            vars.insert(INTERNAL_CLUSTER_MASTER.to_string(), "N".to_string());
        }
    }
    config
}

#[async_trait]
impl ClusterExecutor for RemoteClusterExecutor {
    async fn execute_clustered(
        &self,
        plan: &ClusterPlan,
        config: &ExecutionConfiguration,
        arguments: &[String],
        run: &mut ClusterRun,
    ) -> Result<(), ExecutionError> {
        if !config.cluster.post {
            info!(pipeline = %plan.original_pipeline().name, "Cluster posting disabled, nothing dispatched");
            return Ok(());
        }

        // Master first, so slaves can find it when they start
        if plan.master.has_work() {
            let submission = RunSubmission {
                pipeline: plan.master.pipeline.clone(),
                config: node_config(config, plan, None),
                arguments: arguments.to_vec(),
            };
            let node = self.post(&plan.master, submission, true).await?;
            run.nodes.push(node);
        }

        let posts = plan.slaves.iter().enumerate().map(|(index, slave)| {
            let submission = RunSubmission {
                pipeline: slave.pipeline.clone(),
                config: node_config(config, plan, Some(index)),
                arguments: arguments.to_vec(),
            };
            self.post(slave, submission, false)
        });
        let mut first_error = None;
        for posted in join_all(posts).await {
            match posted {
                Ok(node) => run.nodes.push(node),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        if config.cluster.prepare {
            for node in &run.nodes {
                self.transport
                    .prepare(&node.server, &node.run_id)
                    .await
                    .map_err(|e| ExecutionError::dispatch(&node.server.name, &e))?;
            }
        }

        if config.cluster.start {
            for node in &run.nodes {
                self.transport
                    .start(&node.server, &node.run_id)
                    .await
                    .map_err(|e| ExecutionError::dispatch(&node.server.name, &e))?;
            }
        }

        Ok(())
    }

    fn monitor(&self, node: &DispatchedNode, cancel: &CancellationToken) -> MonitorHandle {
        self.monitor.watch(&node.run_id, &node.server, cancel)
    }

    async fn stop_node(&self, node: &DispatchedNode) -> Result<(), ExecutionError> {
        self.transport
            .stop(&node.server, &node.run_id)
            .await
            .map_err(|e| ExecutionError::dispatch(&node.server.name, &e))
    }

    async fn cleanup_cluster(&self, plan: &ClusterPlan, run: &ClusterRun) -> Result<(), ExecutionError> {
        let mut failures = Vec::new();

        // Slaves before the master; keep going past failures
        for node in run.slaves().chain(run.master()) {
            if let Err(e) = self.transport.cleanup(&node.server, &node.run_id).await {
                warn!(server = %node.server.name, run_id = %node.run_id, "Cleanup failed: {:#}", e);
                failures.push(format!("{}: {:#}", node.server.name, e));
            }
        }

        // A master without steps never ran, so it holds no ports
        if plan.master.has_work() {
            let pipeline_name = &plan.original_pipeline().name;
            match self.transport.release_ports(&plan.master.server, pipeline_name).await {
                Ok(released) => {
                    debug!(server = %plan.master.server.name, pipeline = %pipeline_name, released, "Released cluster ports")
                }
                Err(e) => failures.push(format!("{}: {:#}", plan.master.server.name, e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExecutionError::Dispatch {
                server: plan.master.server.name.clone(),
                message: format!("cluster cleanup failed: {}", failures.join("; ")),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Splitter;
    use crate::cluster::testing::FixedSplitter;
    use crate::remote::testing::{Call, MockTransport};
    use ferry_common::{PipelineDefinition, RunMode};
    use std::time::Duration;

    fn executor(transport: Arc<MockTransport>) -> RemoteClusterExecutor {
        let monitor = RemoteMonitor::new(transport.clone()).with_poll_interval(Duration::from_millis(5));
        RemoteClusterExecutor::new(transport, monitor)
    }

    fn plan(slaves: &[&str]) -> ClusterPlan {
        let pipeline = PipelineDefinition::new("sales").with_steps(["read", "sort"]);
        FixedSplitter::new("master", slaves).split(&pipeline).unwrap()
    }

    #[tokio::test]
    async fn test_every_node_gets_its_own_cluster_variables() {
        let transport = Arc::new(MockTransport::new());
        let config = ExecutionConfiguration::new(RunMode::Clustered).with_variable("SHARED", "x");
        let mut run = ClusterRun::new();

        executor(transport.clone())
            .execute_clustered(&plan(&["s1", "s2"]), &config, &[], &mut run)
            .await
            .unwrap();

        assert_eq!(run.nodes.len(), 3);
        assert!(run.nodes[0].master);

        let master = transport.submission_for("master").unwrap().config.variables;
        assert_eq!(master[INTERNAL_CLUSTER_SIZE], "2");
        assert_eq!(master[INTERNAL_CLUSTER_MASTER], "Y");
        assert!(!master.contains_key(INTERNAL_SLAVE_SERVER_NAME));

        let s2 = transport.submission_for("s2").unwrap().config.variables;
        assert_eq!(s2[INTERNAL_SLAVE_SERVER_NUMBER], "1");
        assert_eq!(s2[INTERNAL_SLAVE_SERVER_NAME], "s2");
        assert_eq!(s2[INTERNAL_CLUSTER_MASTER], "N");
        assert_eq!(s2["SHARED"], "x");

        // The caller's configuration is untouched
        assert!(!config.variables.contains_key(INTERNAL_CLUSTER_SIZE));
    }

    #[tokio::test]
    async fn test_master_posted_first_then_prepared_and_started() {
        let transport = Arc::new(MockTransport::new());
        let mut run = ClusterRun::new();

        executor(transport.clone())
            .execute_clustered(&plan(&["s1"]), &ExecutionConfiguration::new(RunMode::Clustered), &[], &mut run)
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0], (Call::Register, "master".to_string()));
        assert_eq!(transport.servers_called(Call::Prepare), vec!["master", "s1"]);
        assert_eq!(transport.servers_called(Call::Start), vec!["master", "s1"]);
        let last_register = calls.iter().rposition(|(c, _)| *c == Call::Register).unwrap();
        let first_prepare = calls.iter().position(|(c, _)| *c == Call::Prepare).unwrap();
        assert!(last_register < first_prepare);
    }

    #[tokio::test]
    async fn test_master_without_steps_is_skipped() {
        let transport = Arc::new(MockTransport::new());
        let mut plan = plan(&["s1"]);
        plan.master.pipeline.steps.clear();
        let mut run = ClusterRun::new();

        executor(transport.clone())
            .execute_clustered(&plan, &ExecutionConfiguration::new(RunMode::Clustered), &[], &mut run)
            .await
            .unwrap();

        assert!(run.master().is_none());
        assert_eq!(transport.servers_called(Call::Register), vec!["s1"]);
    }

    #[tokio::test]
    async fn test_cluster_options_gate_each_stage() {
        let transport = Arc::new(MockTransport::new());
        let mut config = ExecutionConfiguration::new(RunMode::Clustered);
        config.cluster.start = false;
        let mut run = ClusterRun::new();

        executor(transport.clone())
            .execute_clustered(&plan(&["s1"]), &config, &[], &mut run)
            .await
            .unwrap();
        assert_eq!(transport.count(Call::Prepare), 2);
        assert_eq!(transport.count(Call::Start), 0);

        config.cluster.post = false;
        let transport = Arc::new(MockTransport::new());
        let mut run = ClusterRun::new();
        executor(transport.clone())
            .execute_clustered(&plan(&["s1"]), &config, &[], &mut run)
            .await
            .unwrap();
        assert!(transport.calls().is_empty());
        assert!(run.nodes.is_empty());
    }

    #[tokio::test]
    async fn test_partial_dispatch_is_recorded() {
        let transport = Arc::new(MockTransport::new().fail("s2", Call::Register, "disk full"));
        let mut run = ClusterRun::new();

        let err = executor(transport)
            .execute_clustered(&plan(&["s1", "s2", "s3"]), &ExecutionConfiguration::new(RunMode::Clustered), &[], &mut run)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("disk full"));
        let names: Vec<_> = run.nodes.iter().map(|n| n.server.name.as_str()).collect();
        assert_eq!(names, vec!["master", "s1", "s3"]);
    }

    #[tokio::test]
    async fn test_cleanup_releases_master_ports_and_reports_failures() {
        let transport = Arc::new(MockTransport::new().fail("s1", Call::Cleanup, "gone"));
        let plan = plan(&["s1", "s2"]);
        let mut run = ClusterRun::new();
        let executor = executor(transport.clone());
        executor
            .execute_clustered(&plan, &ExecutionConfiguration::new(RunMode::Clustered), &[], &mut run)
            .await
            .unwrap();

        let err = executor.cleanup_cluster(&plan, &run).await.unwrap_err();
        assert!(err.to_string().contains("s1: gone"));
        assert_eq!(transport.servers_called(Call::Cleanup), vec!["s1", "s2", "master"]);
        assert_eq!(transport.servers_called(Call::Release), vec!["master"]);
    }

    #[tokio::test]
    async fn test_cleanup_skips_port_release_for_idle_master() {
        let transport = Arc::new(MockTransport::new());
        let mut plan = plan(&["s1"]);
        plan.master.pipeline.steps.clear();
        let mut run = ClusterRun::new();
        let executor = executor(transport.clone());
        executor
            .execute_clustered(&plan, &ExecutionConfiguration::new(RunMode::Clustered), &[], &mut run)
            .await
            .unwrap();

        executor.cleanup_cluster(&plan, &run).await.unwrap();
        assert_eq!(transport.servers_called(Call::Cleanup), vec!["s1"]);
        assert_eq!(transport.count(Call::Release), 0);
    }
}
