//! Built-in engine that walks the pipeline's steps without moving rows.
//!
//! Each step runs as its own task, the way a real engine gives every step a
//! worker. Useful for wiring checks and as the default run configuration.

use super::PipelineEngine;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use ferry_common::{LogLevel, PipelineDefinition, RepositoryRef, RunResult};
use std::collections::{BTreeMap, HashSet};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Registered name of the dry-run engine.
pub const NAME: &str = "dry-run";

#[derive(Debug)]
pub struct DryRunEngine {
    pipeline: PipelineDefinition,
    repository: Option<RepositoryRef>,
    log_level: LogLevel,
    safe_mode: bool,
    gather_metrics: bool,
    variables: BTreeMap<String, String>,
    arguments: Vec<String>,
}

impl DryRunEngine {
    pub fn new(pipeline: PipelineDefinition, repository: Option<RepositoryRef>) -> Self {
        Self {
            pipeline,
            repository,
            log_level: LogLevel::default(),
            safe_mode: false,
            gather_metrics: false,
            variables: BTreeMap::new(),
            arguments: Vec::new(),
        }
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Safe mode refuses pipelines whose step names collide.
    fn check_consistency(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for step in &self.pipeline.steps {
            if !seen.insert(step.as_str()) {
                bail!(
                    "Safe mode: step '{}' appears more than once in pipeline '{}'",
                    step,
                    self.pipeline.name
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineEngine for DryRunEngine {
    fn set_log_level(&mut self, level: LogLevel) {
        self.log_level = level;
    }

    fn set_safe_mode(&mut self, safe_mode: bool) {
        self.safe_mode = safe_mode;
    }

    fn set_gather_metrics(&mut self, gather_metrics: bool) {
        self.gather_metrics = gather_metrics;
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        self.variables.insert(name.to_string(), value.to_string());
    }

    fn set_arguments(&mut self, arguments: &[String]) {
        self.arguments = arguments.to_vec();
    }

    async fn run(&mut self) -> Result<RunResult> {
        if self.safe_mode {
            self.check_consistency()?;
        }

        info!(
            pipeline = %self.pipeline.name,
            steps = self.pipeline.steps.len(),
            repository = self.repository.as_ref().map(|r| r.name.as_str()).unwrap_or("-"),
            log_level = %self.log_level,
            "Dry run starting"
        );

        let mut workers = JoinSet::new();
        for (copy, step) in self.pipeline.steps.iter().cloned().enumerate() {
            let pipeline = self.pipeline.name.clone();
            let gather_metrics = self.gather_metrics;
            workers.spawn(async move {
                debug!(pipeline = %pipeline, step = %step, copy, "Step finished");
                if gather_metrics {
                    debug!(pipeline = %pipeline, step = %step, rows = 0, "Step metrics");
                }
                RunResult::success()
            });
        }

        let mut result = RunResult::success();
        while let Some(joined) = workers.join_next().await {
            let step_result = joined.context("Dry-run step worker panicked")?;
            result.add(&step_result);
        }

        info!(pipeline = %self.pipeline.name, success = result.success, "Dry run finished");
        Ok(result)
    }
}
