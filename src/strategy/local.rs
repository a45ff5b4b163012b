//! In-process execution.

use super::ExecutionStrategy;
use crate::engine::EngineRegistry;
use crate::errors::ExecutionError;
use async_trait::async_trait;
use ferry_common::{ExecutionConfiguration, PipelineDefinition, RepositoryRef, RunMode, RunResult};
use std::sync::Arc;
use tracing::info;

/// Runs the pipeline inside this process with the engine named by
/// `config.run_configuration`.
#[derive(Debug, Clone)]
pub struct LocalStrategy {
    engines: Arc<EngineRegistry>,
}

impl LocalStrategy {
    pub fn new(engines: Arc<EngineRegistry>) -> Self {
        Self { engines }
    }
}

#[async_trait]
impl ExecutionStrategy for LocalStrategy {
    fn mode(&self) -> RunMode {
        RunMode::Local
    }

    async fn execute(
        &self,
        pipeline: &PipelineDefinition,
        repository: Option<&RepositoryRef>,
        config: &mut ExecutionConfiguration,
        arguments: &[String],
    ) -> Result<RunResult, ExecutionError> {
        let mut engine = self
            .engines
            .create(&config.run_configuration, pipeline, repository)?;

        engine.set_log_level(config.log_level);
        engine.set_safe_mode(config.safe_mode);
        engine.set_gather_metrics(config.gather_metrics);
        for (name, value) in &config.variables {
            engine.set_variable(name, value);
        }
        engine.set_arguments(arguments);

        info!(
            pipeline = %pipeline.name,
            engine = %config.run_configuration,
            "Running pipeline locally"
        );
        engine.run().await.map_err(ExecutionError::Engine)
    }
}
