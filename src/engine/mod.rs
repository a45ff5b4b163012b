//! In-process pipeline engines and the registry that builds them.
//!
//! The row-processing engine is pluggable. Engines are looked up by run
//! configuration name in an [`EngineRegistry`] assembled at startup and
//! handed to the local strategy; there is no global registry.

pub mod dry_run;

use crate::errors::ConfigurationError;
use anyhow::Result;
use async_trait::async_trait;
use ferry_common::{LogLevel, PipelineDefinition, RepositoryRef, RunResult};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use dry_run::DryRunEngine;

/// A runnable, in-process pipeline instance.
///
/// The local strategy configures the instance through the setters, then
/// calls [`run`](PipelineEngine::run), which starts the engine's workers and
/// resolves once all of them have finished.
#[async_trait]
pub trait PipelineEngine: Send {
    fn set_log_level(&mut self, level: LogLevel);

    fn set_safe_mode(&mut self, safe_mode: bool);

    fn set_gather_metrics(&mut self, gather_metrics: bool);

    fn set_variable(&mut self, name: &str, value: &str);

    fn set_arguments(&mut self, arguments: &[String]);

    /// Run to completion and return the accumulated result.
    async fn run(&mut self) -> Result<RunResult>;
}

/// Builds an engine bound to a pipeline and an optional repository.
pub type EngineConstructor =
    Arc<dyn Fn(&PipelineDefinition, Option<&RepositoryRef>) -> Box<dyn PipelineEngine> + Send + Sync>;

/// Run configuration name → engine constructor.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    constructors: BTreeMap<String, EngineConstructor>,
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl EngineRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in engines.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(dry_run::NAME, |pipeline, repository| {
            Box::new(DryRunEngine::new(pipeline.clone(), repository.cloned()))
        });
        registry
    }

    /// Register a constructor, replacing any previous one with the same name.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(&PipelineDefinition, Option<&RepositoryRef>) -> Box<dyn PipelineEngine> + Send + Sync + 'static,
    {
        self.constructors.insert(name.to_string(), Arc::new(constructor));
        self
    }

    /// Build an engine for the named run configuration.
    pub fn create(
        &self,
        name: &str,
        pipeline: &PipelineDefinition,
        repository: Option<&RepositoryRef>,
    ) -> Result<Box<dyn PipelineEngine>, ConfigurationError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownRunConfiguration {
                name: name.to_string(),
            })?;
        Ok(constructor(pipeline, repository))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }
}
