//! Request and response bodies exchanged with worker nodes.

use crate::config::ExecutionConfiguration;
use crate::pipeline::PipelineDefinition;
use crate::result::RunResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generate a fresh identifier for one execution attempt.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A pipeline plus everything needed to run it on a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSubmission {
    pub pipeline: PipelineDefinition,
    pub config: ExecutionConfiguration,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Reply to a run registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRegistered {
    pub run_id: String,
}

/// Lifecycle of a run on a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Registered, not yet started
    Waiting,
    /// Prepared, ready to start
    Prepared,
    Running,
    Finished,
    FinishedWithErrors,
    Stopped,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::FinishedWithErrors | Self::Stopped)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunState::Waiting => "Waiting",
            RunState::Prepared => "Prepared",
            RunState::Running => "Running",
            RunState::Finished => "Finished",
            RunState::FinishedWithErrors => "Finished (with errors)",
            RunState::Stopped => "Stopped",
        };
        write!(f, "{}", label)
    }
}

/// Status of one run as reported by its worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub run_id: String,
    pub pipeline_name: String,
    pub state: RunState,
    /// Definitive counters, present once the run has finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteStatus {
    pub fn new(run_id: impl Into<String>, pipeline_name: impl Into<String>, state: RunState) -> Self {
        Self {
            run_id: run_id.into(),
            pipeline_name: pipeline_name.into(),
            state,
            result: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_result(mut self, result: RunResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The result this status stands for.
    ///
    /// Uses the worker's counters when it reported them; otherwise a zeroed
    /// result whose success follows the final state.
    pub fn run_result(&self) -> RunResult {
        match self.result {
            Some(result) => result,
            None => match self.state {
                RunState::FinishedWithErrors | RunState::Stopped => RunResult::failure(1),
                _ => RunResult::success(),
            },
        }
    }
}

/// Request for a port connecting two step copies on a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRequest {
    pub base_port: u16,
    pub host: String,
    /// Per-run identifier; never part of the port identity
    #[serde(default)]
    pub run_id: String,
    pub pipeline_name: String,
    pub source_slave: String,
    pub source_step: String,
    pub source_copy: u32,
    pub target_slave: String,
    pub target_step: String,
    pub target_copy: u32,
}

/// Reply to a port allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAllocated {
    pub port: u16,
}

/// Request to free one port on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDeallocation {
    pub host: String,
    pub port: u16,
}

/// Request to free every port held by a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRelease {
    pub pipeline_name: String,
}

/// Reply to a pipeline-wide port release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortsReleased {
    pub released: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Finished.is_terminal());
        assert!(RunState::FinishedWithErrors.is_terminal());
        assert!(RunState::Stopped.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(!RunState::Waiting.is_terminal());
    }

    #[test]
    fn test_run_result_prefers_reported_counters() {
        let reported = RunResult {
            lines_written: 7,
            ..RunResult::success()
        };
        let status = RemoteStatus::new("r1", "p", RunState::Finished).with_result(reported);
        assert_eq!(status.run_result().lines_written, 7);
    }

    #[test]
    fn test_run_result_falls_back_on_state() {
        let ok = RemoteStatus::new("r1", "p", RunState::Finished);
        assert!(ok.run_result().success);

        let failed = RemoteStatus::new("r1", "p", RunState::FinishedWithErrors);
        assert!(!failed.run_result().success);
        assert_eq!(failed.run_result().error_count, 1);
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(new_run_id(), new_run_id());
    }
}
