//! Background wait for a remote run.
//!
//! [`RemoteMonitor::watch`] spawns a polling task and hands back a
//! [`MonitorHandle`]. The caller is free to log or dispatch more work before
//! joining. Joining yields a typed [`MonitorOutcome`]; a cancelled watch
//! never reports success, because the remote run's fate is unknown at that
//! point. Dropping the handle, or a future that owns it, ends the watch.

use super::RemoteTransport;
use crate::errors::MonitorError;
use ferry_common::{RemoteServer, RemoteStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// How a watch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    /// The run reached a terminal state
    Completed(RemoteStatus),
    /// Polling itself failed
    Failed(String),
    /// The watch was cancelled before the run finished
    Cancelled,
}

/// Polls run status through a transport.
#[derive(Clone)]
pub struct RemoteMonitor {
    transport: Arc<dyn RemoteTransport>,
    poll_interval: Duration,
}

impl RemoteMonitor {
    pub fn new(transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            transport,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start watching `run_id` on `server`.
    ///
    /// The watch is cancelled when `parent` is, or when the returned handle's
    /// [`cancel`](MonitorHandle::cancel) is called.
    pub fn watch(&self, run_id: &str, server: &RemoteServer, parent: &CancellationToken) -> MonitorHandle {
        let cancel = parent.child_token();
        let task = tokio::spawn(poll_until_terminal(
            self.transport.clone(),
            server.clone(),
            run_id.to_string(),
            self.poll_interval,
            cancel.clone(),
        ));
        MonitorHandle {
            run_id: run_id.to_string(),
            server: server.name.clone(),
            _stop_on_drop: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }
}

async fn poll_until_terminal(
    transport: Arc<dyn RemoteTransport>,
    server: RemoteServer,
    run_id: String,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> MonitorOutcome {
    loop {
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return MonitorOutcome::Cancelled,
            status = transport.status(&server, &run_id) => status,
        };

        match status {
            Ok(status) if status.is_terminal() => {
                debug!(server = %server.name, run_id = %run_id, state = %status.state, "Remote run finished");
                return MonitorOutcome::Completed(status);
            }
            Ok(status) => {
                debug!(server = %server.name, run_id = %run_id, state = %status.state, "Remote run still active");
            }
            Err(e) => return MonitorOutcome::Failed(format!("{:#}", e)),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return MonitorOutcome::Cancelled,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

/// A running watch. The polling task stops when the handle is dropped.
#[derive(Debug)]
pub struct MonitorHandle {
    run_id: String,
    server: String,
    cancel: CancellationToken,
    _stop_on_drop: DropGuard,
    task: JoinHandle<MonitorOutcome>,
}

impl MonitorHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Ask the watch to stop; `join` then reports `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the watch to end.
    pub async fn join(self) -> MonitorOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => MonitorOutcome::Cancelled,
            Err(e) => MonitorOutcome::Failed(format!("monitor task panicked: {}", e)),
        }
    }

    /// Wait for the watch and turn anything but completion into an error.
    pub async fn wait(self) -> Result<RemoteStatus, MonitorError> {
        let server = self.server.clone();
        let run_id = self.run_id.clone();
        match self.join().await {
            MonitorOutcome::Completed(status) => Ok(status),
            MonitorOutcome::Failed(message) => Err(MonitorError::Failed {
                server,
                run_id,
                message,
            }),
            MonitorOutcome::Cancelled => Err(MonitorError::Cancelled { server, run_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::{Call, MockTransport};
    use ferry_common::{
        ExecutionConfiguration, PipelineDefinition, RunMode, RunState, RunSubmission,
    };

    async fn started_run(transport: &MockTransport, server: &RemoteServer) -> String {
        let submission = RunSubmission {
            pipeline: PipelineDefinition::new("p"),
            config: ExecutionConfiguration::new(RunMode::Remote),
            arguments: vec![],
        };
        let run_id = transport.register(server, &submission).await.unwrap();
        transport.start(server, &run_id).await.unwrap();
        run_id
    }

    fn monitor(transport: Arc<MockTransport>) -> RemoteMonitor {
        RemoteMonitor::new(transport).with_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_watch_completes_when_run_finishes() {
        let transport = Arc::new(MockTransport::new().with_polls_before_finish(3));
        let server = RemoteServer::new("w1", "localhost", 8181);
        let run_id = started_run(&transport, &server).await;

        let handle = monitor(transport.clone()).watch(&run_id, &server, &CancellationToken::new());
        let status = handle.wait().await.unwrap();
        assert_eq!(status.state, RunState::Finished);
        assert_eq!(transport.count(Call::Status), 3);
    }

    #[tokio::test]
    async fn test_status_failure_is_reported_as_failed() {
        let transport = Arc::new(MockTransport::new().fail("w1", Call::Status, "connection reset"));
        let server = RemoteServer::new("w1", "localhost", 8181);

        let handle = monitor(transport).watch("run-x", &server, &CancellationToken::new());
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, MonitorError::Failed { ref message, .. } if message.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_cancelled_watch_never_reports_success() {
        let transport = Arc::new(MockTransport::new().hang("w1"));
        let server = RemoteServer::new("w1", "localhost", 8181);
        let run_id = started_run(&transport, &server).await;

        let handle = monitor(transport).watch(&run_id, &server, &CancellationToken::new());
        handle.cancel();
        assert_eq!(handle.join().await, MonitorOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_every_watch() {
        let transport = Arc::new(MockTransport::new().hang("w1"));
        let server = RemoteServer::new("w1", "localhost", 8181);
        let run_id = started_run(&transport, &server).await;
        let parent = CancellationToken::new();

        let monitor = monitor(transport);
        let first = monitor.watch(&run_id, &server, &parent);
        let second = monitor.watch(&run_id, &server, &parent);
        parent.cancel();

        let err = first.wait().await.unwrap_err();
        assert_eq!(
            err,
            MonitorError::Cancelled {
                server: "w1".to_string(),
                run_id: run_id.clone()
            }
        );
        assert_eq!(second.join().await, MonitorOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_handle_stops_polling() {
        let transport = Arc::new(MockTransport::new().hang("w1"));
        let server = RemoteServer::new("w1", "localhost", 8181);
        let run_id = started_run(&transport, &server).await;

        let handle = monitor(transport.clone()).watch(&run_id, &server, &CancellationToken::new());
        let timed_out = tokio::time::timeout(Duration::from_millis(30), handle.join()).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_drop = transport.count(Call::Status);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.count(Call::Status), after_drop);
    }

    #[tokio::test]
    async fn test_dropping_unjoined_handle_stops_polling() {
        let transport = Arc::new(MockTransport::new().hang("w1"));
        let server = RemoteServer::new("w1", "localhost", 8181);
        let run_id = started_run(&transport, &server).await;

        let handle = monitor(transport.clone()).watch(&run_id, &server, &CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(handle);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_drop = transport.count(Call::Status);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.count(Call::Status), after_drop);
    }
}
