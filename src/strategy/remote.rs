//! Execution on one designated worker.

use super::ExecutionStrategy;
use crate::errors::{ConfigurationError, ExecutionError};
use crate::injection;
use crate::remote::{RemoteMonitor, RemoteTransport};
use async_trait::async_trait;
use ferry_common::{
    ExecutionConfiguration, PipelineDefinition, RemoteServer, RepositoryRef, RunMode, RunResult,
    RunSubmission,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Sends the pipeline to `config.remote_server`, starts it, waits for it to
/// finish, then cleans the run up on the worker.
///
/// When the wait is cancelled the call fails with
/// [`MonitorError::Cancelled`](crate::errors::MonitorError::Cancelled) and the
/// remote run is left alone: it may still be running.
pub struct RemoteStrategy {
    transport: Arc<dyn RemoteTransport>,
    monitor: RemoteMonitor,
    cancel: CancellationToken,
}

impl RemoteStrategy {
    pub fn new(transport: Arc<dyn RemoteTransport>, monitor: RemoteMonitor, cancel: CancellationToken) -> Self {
        Self {
            transport,
            monitor,
            cancel,
        }
    }

    /// Register, prepare and start a run; returns its run id.
    async fn send(&self, server: &RemoteServer, submission: &RunSubmission) -> Result<String, ExecutionError> {
        let run_id = self
            .transport
            .register(server, submission)
            .await
            .map_err(|e| ExecutionError::dispatch(&server.name, &e))?;
        self.transport
            .prepare(server, &run_id)
            .await
            .map_err(|e| ExecutionError::dispatch(&server.name, &e))?;
        self.transport
            .start(server, &run_id)
            .await
            .map_err(|e| ExecutionError::dispatch(&server.name, &e))?;
        Ok(run_id)
    }
}

/// Remote and clustered runs identify pipelines by name on the worker.
pub(crate) fn require_name(pipeline: &PipelineDefinition) -> Result<(), ConfigurationError> {
    if pipeline.name.trim().is_empty() {
        return Err(ConfigurationError::UnnamedPipeline);
    }
    Ok(())
}

#[async_trait]
impl ExecutionStrategy for RemoteStrategy {
    fn mode(&self) -> RunMode {
        RunMode::Remote
    }

    async fn execute(
        &self,
        pipeline: &PipelineDefinition,
        _repository: Option<&RepositoryRef>,
        config: &mut ExecutionConfiguration,
        arguments: &[String],
    ) -> Result<RunResult, ExecutionError> {
        let server = config
            .remote_server
            .clone()
            .ok_or(ConfigurationError::NoRemoteServerConfigured)?;
        require_name(pipeline)?;

        injection::inject(config, pipeline, pipeline);

        let submission = RunSubmission {
            pipeline: pipeline.clone(),
            config: config.clone(),
            arguments: arguments.to_vec(),
        };
        let run_id = self.send(&server, &submission).await?;

        let handle = self.monitor.watch(&run_id, &server, &self.cancel);
        info!(
            pipeline = %pipeline.name,
            server = %server,
            run_id = %run_id,
            "Pipeline started on remote server"
        );

        let status = handle.wait().await?;
        if let Some(error) = &status.error {
            warn!(server = %server.name, run_id = %run_id, "Remote run reported: {}", error);
        }
        let mut result = status.run_result();

        if let Err(e) = self.transport.cleanup(&server, &run_id).await {
            warn!(server = %server.name, run_id = %run_id, "Remote run cleanup failed: {:#}", e);
            result.record_error();
        }

        info!(
            pipeline = %pipeline.name,
            server = %server.name,
            state = %status.state,
            errors = result.error_count,
            "Remote run finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MonitorError;
    use crate::remote::testing::{Call, MockTransport};
    use ferry_common::variables::INTERNAL_PIPELINE_NAME;
    use ferry_common::{ParameterDefinition, RunState};
    use std::time::Duration;

    fn strategy(transport: Arc<MockTransport>) -> RemoteStrategy {
        strategy_with_cancel(transport, CancellationToken::new())
    }

    fn strategy_with_cancel(transport: Arc<MockTransport>, cancel: CancellationToken) -> RemoteStrategy {
        let monitor = RemoteMonitor::new(transport.clone()).with_poll_interval(Duration::from_millis(5));
        RemoteStrategy::new(transport, monitor, cancel)
    }

    fn remote_config() -> ExecutionConfiguration {
        ExecutionConfiguration::new(RunMode::Remote).with_remote_server(RemoteServer::new("w1", "10.0.0.4", 8181))
    }

    #[tokio::test]
    async fn test_missing_server_fails_without_network() {
        let transport = Arc::new(MockTransport::new());
        let mut config = ExecutionConfiguration::new(RunMode::Remote);

        let err = strategy(transport.clone())
            .execute(&PipelineDefinition::new("p"), None, &mut config, &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Configuration(ConfigurationError::NoRemoteServerConfigured)
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unnamed_pipeline_rejected() {
        let transport = Arc::new(MockTransport::new());
        let err = strategy(transport.clone())
            .execute(&PipelineDefinition::new("  "), None, &mut remote_config(), &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Configuration(ConfigurationError::UnnamedPipeline)
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_submission_carries_injected_variables() {
        let transport = Arc::new(MockTransport::new());
        let pipeline = PipelineDefinition::new("sales")
            .with_parameter(ParameterDefinition::new("REGION").with_default("EU"))
            .with_variable("REGION", "US");
        let mut config = remote_config();

        strategy(transport.clone())
            .execute(&pipeline, None, &mut config, &["2024".to_string()])
            .await
            .unwrap();

        assert_eq!(config.variables["REGION"], "EU");
        assert_eq!(config.variables[INTERNAL_PIPELINE_NAME], "sales");
        let submission = transport.submission_for("w1").unwrap();
        assert_eq!(submission.config.variables["REGION"], "EU");
        assert_eq!(submission.arguments, vec!["2024"]);
        assert_eq!(
            transport.calls().iter().map(|(c, _)| *c).take(3).collect::<Vec<_>>(),
            vec![Call::Register, Call::Prepare, Call::Start]
        );
    }

    #[tokio::test]
    async fn test_definitive_result_comes_from_final_status() {
        let failed = RunResult {
            lines_read: 40,
            ..RunResult::failure(3)
        };
        let transport = Arc::new(MockTransport::new().with_result("w1", failed));

        let result = strategy(transport)
            .execute(&PipelineDefinition::new("p"), None, &mut remote_config(), &[])
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_count, 3);
        assert_eq!(result.lines_read, 40);
    }

    #[tokio::test]
    async fn test_register_failure_is_a_dispatch_error() {
        let transport = Arc::new(MockTransport::new().fail("w1", Call::Register, "connection refused"));

        let err = strategy(transport)
            .execute(&PipelineDefinition::new("p"), None, &mut remote_config(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Dispatch { ref server, .. } if server == "w1"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_cancellation_is_reported_and_run_left_alone() {
        let transport = Arc::new(MockTransport::new().hang("w1"));
        let cancel = CancellationToken::new();
        let strategy = strategy_with_cancel(transport.clone(), cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        });
        let err = strategy
            .execute(&PipelineDefinition::new("p"), None, &mut remote_config(), &[])
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(err.is_cancelled());
        assert!(matches!(err, ExecutionError::Monitor(MonitorError::Cancelled { .. })));
        assert_eq!(transport.count(Call::Stop), 0);
        assert_eq!(transport.count(Call::Cleanup), 0);
        assert_eq!(transport.state_of("run-1"), Some(RunState::Running));
    }

    #[tokio::test]
    async fn test_finished_run_is_cleaned_up_on_worker() {
        let transport = Arc::new(MockTransport::new());

        let result = strategy(transport.clone())
            .execute(&PipelineDefinition::new("p"), None, &mut remote_config(), &[])
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(transport.servers_called(Call::Cleanup), vec!["w1"]);
        assert_eq!(transport.state_of("run-1"), None);
    }

    #[tokio::test]
    async fn test_cleanup_failure_counts_as_error() {
        let transport = Arc::new(MockTransport::new().fail("w1", Call::Cleanup, "worker restarted"));

        let result = strategy(transport)
            .execute(&PipelineDefinition::new("p"), None, &mut remote_config(), &[])
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_count, 1);
    }

    #[tokio::test]
    async fn test_abandoned_wait_stops_polling() {
        let transport = Arc::new(MockTransport::new().hang("w1"));
        let strategy = strategy(transport.clone());
        let pipeline = PipelineDefinition::new("p");
        let mut config = remote_config();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            strategy.execute(&pipeline, None, &mut config, &[]),
        )
        .await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_timeout = transport.count(Call::Status);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.count(Call::Status), after_timeout);
        assert_eq!(transport.count(Call::Cleanup), 0);
    }
}
