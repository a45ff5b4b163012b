//! Talking to worker nodes.
//!
//! [`RemoteTransport`] is the narrow protocol the strategies need from a
//! worker: register a run, drive it through prepare and start, poll its
//! status, stop and clean it up, and manage the worker's port table.
//! [`http::HttpTransport`] is the production implementation;
//! [`monitor::RemoteMonitor`] builds the background wait on top of it.

pub mod http;
pub mod monitor;

use anyhow::Result;
use async_trait::async_trait;
use ferry_common::{PortRequest, RemoteServer, RemoteStatus, RunSubmission};

pub use http::HttpTransport;
pub use monitor::{MonitorHandle, MonitorOutcome, RemoteMonitor};

/// Per-node remote protocol.
///
/// Errors are `anyhow` chains with context naming the failed call; the
/// strategies turn them into typed dispatch or monitor errors.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Submit a pipeline and its configuration; returns the worker's run id.
    async fn register(&self, server: &RemoteServer, submission: &RunSubmission) -> Result<String>;

    async fn prepare(&self, server: &RemoteServer, run_id: &str) -> Result<()>;

    async fn start(&self, server: &RemoteServer, run_id: &str) -> Result<()>;

    async fn status(&self, server: &RemoteServer, run_id: &str) -> Result<RemoteStatus>;

    async fn stop(&self, server: &RemoteServer, run_id: &str) -> Result<()>;

    /// Release everything the worker holds for a finished or stopped run.
    async fn cleanup(&self, server: &RemoteServer, run_id: &str) -> Result<()>;

    async fn allocate_port(&self, server: &RemoteServer, request: &PortRequest) -> Result<u16>;

    async fn deallocate_port(&self, server: &RemoteServer, host: &str, port: u16) -> Result<()>;

    /// Free every port the worker has handed out for a pipeline; returns how
    /// many bindings were dropped.
    async fn release_ports(&self, server: &RemoteServer, pipeline_name: &str) -> Result<usize>;
}

#[cfg(test)]
pub mod testing {
    //! Scriptable in-memory transport.

    use super::*;
    use crate::ports::PortAllocator;
    use anyhow::{anyhow, bail};
    use ferry_common::{RunResult, RunState};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Call {
        Register,
        Prepare,
        Start,
        Status,
        Stop,
        Cleanup,
        Release,
    }

    struct MockRun {
        server: String,
        state: RunState,
        polls: u32,
    }

    #[derive(Default)]
    struct MockState {
        next_id: u32,
        runs: HashMap<String, MockRun>,
        failures: HashMap<(String, Call), String>,
        hanging: HashSet<String>,
        results: HashMap<String, RunResult>,
        calls: Vec<(Call, String)>,
        submissions: Vec<(String, RunSubmission)>,
    }

    /// In-memory worker fleet keyed by server name.
    ///
    /// Runs finish after `polls_before_finish` status calls, reporting the
    /// result scripted for their server (success by default).
    pub struct MockTransport {
        state: Mutex<MockState>,
        polls_before_finish: u32,
        ports: PortAllocator,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                state: Mutex::new(MockState::default()),
                polls_before_finish: 1,
                ports: PortAllocator::new(),
            }
        }

        pub fn with_polls_before_finish(mut self, polls: u32) -> Self {
            self.polls_before_finish = polls;
            self
        }

        /// Make `call` fail on `server` with `message`.
        pub fn fail(self, server: &str, call: Call, message: &str) -> Self {
            self.state
                .lock()
                .unwrap()
                .failures
                .insert((server.to_string(), call), message.to_string());
            self
        }

        /// Runs on `server` never finish.
        pub fn hang(self, server: &str) -> Self {
            self.state.lock().unwrap().hanging.insert(server.to_string());
            self
        }

        pub fn with_result(self, server: &str, result: RunResult) -> Self {
            self.state.lock().unwrap().results.insert(server.to_string(), result);
            self
        }

        /// Every call made so far as `(call, server)`, in order.
        pub fn calls(&self) -> Vec<(Call, String)> {
            self.state.lock().unwrap().calls.clone()
        }

        pub fn count(&self, call: Call) -> usize {
            self.calls().iter().filter(|(c, _)| *c == call).count()
        }

        pub fn servers_called(&self, call: Call) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|(c, _)| *c == call)
                .map(|(_, s)| s)
                .collect()
        }

        /// Submissions received, as `(server, submission)`.
        pub fn submissions(&self) -> Vec<(String, RunSubmission)> {
            self.state.lock().unwrap().submissions.clone()
        }

        pub fn submission_for(&self, server: &str) -> Option<RunSubmission> {
            self.submissions()
                .into_iter()
                .find(|(s, _)| s == server)
                .map(|(_, submission)| submission)
        }

        pub fn state_of(&self, run_id: &str) -> Option<RunState> {
            self.state.lock().unwrap().runs.get(run_id).map(|r| r.state)
        }

        pub fn ports(&self) -> &PortAllocator {
            &self.ports
        }

        fn record(&self, call: Call, server: &RemoteServer) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push((call, server.name.clone()));
            match state.failures.get(&(server.name.clone(), call)) {
                Some(message) => bail!("{}", message),
                None => Ok(()),
            }
        }

        fn set_state(&self, run_id: &str, new_state: RunState) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            let run = state
                .runs
                .get_mut(run_id)
                .ok_or_else(|| anyhow!("Unknown run {}", run_id))?;
            run.state = new_state;
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteTransport for MockTransport {
        async fn register(&self, server: &RemoteServer, submission: &RunSubmission) -> Result<String> {
            self.record(Call::Register, server)?;
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let run_id = format!("run-{}", state.next_id);
            state.runs.insert(
                run_id.clone(),
                MockRun {
                    server: server.name.clone(),
                    state: RunState::Waiting,
                    polls: 0,
                },
            );
            state.submissions.push((server.name.clone(), submission.clone()));
            Ok(run_id)
        }

        async fn prepare(&self, server: &RemoteServer, run_id: &str) -> Result<()> {
            self.record(Call::Prepare, server)?;
            self.set_state(run_id, RunState::Prepared)
        }

        async fn start(&self, server: &RemoteServer, run_id: &str) -> Result<()> {
            self.record(Call::Start, server)?;
            self.set_state(run_id, RunState::Running)
        }

        async fn status(&self, server: &RemoteServer, run_id: &str) -> Result<RemoteStatus> {
            self.record(Call::Status, server)?;
            let mut state = self.state.lock().unwrap();
            let hanging = state.hanging.contains(&server.name);
            let scripted = state.results.get(&server.name).copied();
            let run = state
                .runs
                .get_mut(run_id)
                .ok_or_else(|| anyhow!("Unknown run {}", run_id))?;

            if run.state == RunState::Running && !hanging {
                run.polls += 1;
                if run.polls >= self.polls_before_finish {
                    let result = scripted.unwrap_or_else(RunResult::success);
                    run.state = if result.success {
                        RunState::Finished
                    } else {
                        RunState::FinishedWithErrors
                    };
                    return Ok(RemoteStatus::new(run_id, &run.server, run.state).with_result(result));
                }
            }
            Ok(RemoteStatus::new(run_id, &run.server, run.state))
        }

        async fn stop(&self, server: &RemoteServer, run_id: &str) -> Result<()> {
            self.record(Call::Stop, server)?;
            let mut state = self.state.lock().unwrap();
            if let Some(run) = state.runs.get_mut(run_id) {
                if !run.state.is_terminal() {
                    run.state = RunState::Stopped;
                }
            }
            Ok(())
        }

        async fn cleanup(&self, server: &RemoteServer, run_id: &str) -> Result<()> {
            self.record(Call::Cleanup, server)?;
            self.state.lock().unwrap().runs.remove(run_id);
            Ok(())
        }

        async fn allocate_port(&self, _server: &RemoteServer, request: &PortRequest) -> Result<u16> {
            Ok(self.ports.allocate(request)?)
        }

        async fn deallocate_port(&self, _server: &RemoteServer, host: &str, port: u16) -> Result<()> {
            self.ports.deallocate(host, port)?;
            Ok(())
        }

        async fn release_ports(&self, server: &RemoteServer, pipeline_name: &str) -> Result<usize> {
            self.record(Call::Release, server)?;
            Ok(self.ports.release_pipeline(pipeline_name)?)
        }
    }
}
