//! Execution strategies and the dispatcher that picks one per run mode.
//!
//! Every strategy answers the same call: run this pipeline with this
//! configuration and these arguments, and return a [`RunResult`] or an
//! [`ExecutionError`]. A strategy call resolves only after any background
//! monitoring it started has finished. Nothing here retries.

pub mod clustered;
pub mod local;
pub mod remote;

use crate::cluster::{ClusterCoordinator, ClusterExecutor, RemoteClusterExecutor, Splitter};
use crate::engine::EngineRegistry;
use crate::errors::{ConfigurationError, ExecutionError};
use crate::remote::{RemoteMonitor, RemoteTransport};
use async_trait::async_trait;
use ferry_common::{ExecutionConfiguration, PipelineDefinition, RepositoryRef, RunMode, RunResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use clustered::ClusteredStrategy;
pub use local::LocalStrategy;
pub use remote::RemoteStrategy;

/// One way of running a pipeline.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn mode(&self) -> RunMode;

    /// Run `pipeline` and wait for it to finish.
    ///
    /// `config` is private to this call: remote and clustered strategies
    /// insert internal variables and resolved parameters into it before
    /// dispatching.
    async fn execute(
        &self,
        pipeline: &PipelineDefinition,
        repository: Option<&RepositoryRef>,
        config: &mut ExecutionConfiguration,
        arguments: &[String],
    ) -> Result<RunResult, ExecutionError>;
}

/// Routes a run to the strategy for `config.mode`.
///
/// All collaborators are passed in; the dispatcher owns no global state.
#[derive(Clone)]
pub struct Dispatcher {
    engines: Arc<EngineRegistry>,
    transport: Arc<dyn RemoteTransport>,
    splitter: Option<Arc<dyn Splitter>>,
    executor: Option<Arc<dyn ClusterExecutor>>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(engines: EngineRegistry, transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            engines: Arc::new(engines),
            transport,
            splitter: None,
            executor: None,
            poll_interval: crate::remote::monitor::DEFAULT_POLL_INTERVAL,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_splitter(mut self, splitter: Arc<dyn Splitter>) -> Self {
        self.splitter = Some(splitter);
        self
    }

    /// Replace the default remote cluster executor.
    pub fn with_cluster_executor(mut self, executor: Arc<dyn ClusterExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Cancelling `cancel` interrupts every wait started by this dispatcher.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn monitor(&self) -> RemoteMonitor {
        RemoteMonitor::new(self.transport.clone()).with_poll_interval(self.poll_interval)
    }

    /// Build the strategy for `mode`.
    pub fn strategy(&self, mode: RunMode) -> Result<Box<dyn ExecutionStrategy>, ConfigurationError> {
        let strategy: Box<dyn ExecutionStrategy> = match mode {
            RunMode::Local => Box::new(LocalStrategy::new(self.engines.clone())),
            RunMode::Remote => Box::new(RemoteStrategy::new(
                self.transport.clone(),
                self.monitor(),
                self.cancel.clone(),
            )),
            RunMode::Clustered => {
                let splitter = self.splitter.clone().ok_or(ConfigurationError::NoSplitter)?;
                let executor = self.executor.clone().unwrap_or_else(|| {
                    Arc::new(RemoteClusterExecutor::new(self.transport.clone(), self.monitor()))
                });
                Box::new(ClusteredStrategy::new(ClusterCoordinator::new(
                    splitter,
                    executor,
                    self.cancel.clone(),
                )))
            }
        };
        Ok(strategy)
    }

    /// Run `pipeline` with the strategy selected by `config.mode`.
    pub async fn execute(
        &self,
        pipeline: &PipelineDefinition,
        repository: Option<&RepositoryRef>,
        config: &mut ExecutionConfiguration,
        arguments: &[String],
    ) -> Result<RunResult, ExecutionError> {
        let strategy = self.strategy(config.mode)?;
        strategy.execute(pipeline, repository, config, arguments).await
    }
}
