//! Execution split across a worker cluster.

use super::ExecutionStrategy;
use crate::cluster::ClusterCoordinator;
use crate::errors::ExecutionError;
use async_trait::async_trait;
use ferry_common::{ExecutionConfiguration, PipelineDefinition, RepositoryRef, RunMode, RunResult};

/// Hands the run to a [`ClusterCoordinator`].
pub struct ClusteredStrategy {
    coordinator: ClusterCoordinator,
}

impl ClusteredStrategy {
    pub fn new(coordinator: ClusterCoordinator) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl ExecutionStrategy for ClusteredStrategy {
    fn mode(&self) -> RunMode {
        RunMode::Clustered
    }

    async fn execute(
        &self,
        pipeline: &PipelineDefinition,
        _repository: Option<&RepositoryRef>,
        config: &mut ExecutionConfiguration,
        arguments: &[String],
    ) -> Result<RunResult, ExecutionError> {
        self.coordinator.execute(pipeline, config, arguments).await
    }
}
