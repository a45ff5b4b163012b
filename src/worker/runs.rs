//! Runs registered on this worker.
//!
//! A run moves `Waiting -> Prepared -> Running -> Finished | FinishedWithErrors`,
//! or to `Stopped` from any non-terminal state. Started runs execute through
//! the local strategy on a background task.

use crate::engine::EngineRegistry;
use crate::strategy::{ExecutionStrategy, LocalStrategy};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ferry_common::{
    PipelineDefinition, RemoteStatus, RunMode, RunResult, RunState, RunSubmission, new_run_id,
};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("Unknown run '{0}'")]
    NotFound(String),

    #[error("Run '{run_id}' cannot {action} while {state}")]
    InvalidState {
        run_id: String,
        action: &'static str,
        state: RunState,
    },
}

struct RunEntry {
    submission: RunSubmission,
    state: RunState,
    result: Option<RunResult>,
    error: Option<String>,
    updated_at: DateTime<Utc>,
    cancel: CancellationToken,
}

impl RunEntry {
    fn status(&self, run_id: &str) -> RemoteStatus {
        RemoteStatus {
            run_id: run_id.to_string(),
            pipeline_name: self.submission.pipeline.name.clone(),
            state: self.state,
            result: self.result,
            error: self.error.clone(),
            updated_at: self.updated_at,
        }
    }

    fn set_state(&mut self, state: RunState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

pub struct RunRegistry {
    runs: DashMap<String, RunEntry>,
    engines: Arc<EngineRegistry>,
}

impl RunRegistry {
    pub fn new(engines: Arc<EngineRegistry>) -> Self {
        Self {
            runs: DashMap::new(),
            engines,
        }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn register(&self, submission: RunSubmission) -> String {
        let run_id = new_run_id();
        info!(run_id = %run_id, pipeline = %submission.pipeline.name, "Run registered");
        self.runs.insert(
            run_id.clone(),
            RunEntry {
                submission,
                state: RunState::Waiting,
                result: None,
                error: None,
                updated_at: Utc::now(),
                cancel: CancellationToken::new(),
            },
        );
        run_id
    }

    pub fn status(&self, run_id: &str) -> Result<RemoteStatus, RunError> {
        self.runs
            .get(run_id)
            .map(|entry| entry.status(run_id))
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))
    }

    /// `Waiting -> Prepared`; preparing twice is harmless.
    pub fn prepare(&self, run_id: &str) -> Result<RemoteStatus, RunError> {
        let mut entry = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
        match entry.state {
            RunState::Waiting => entry.set_state(RunState::Prepared),
            RunState::Prepared => {}
            state => {
                return Err(RunError::InvalidState {
                    run_id: run_id.to_string(),
                    action: "prepare",
                    state,
                });
            }
        }
        Ok(entry.status(run_id))
    }

    /// Start executing a waiting or prepared run in the background.
    pub fn start(self: &Arc<Self>, run_id: &str) -> Result<RemoteStatus, RunError> {
        let (pipeline, mut config, arguments, cancel, status) = {
            let mut entry = self
                .runs
                .get_mut(run_id)
                .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
            match entry.state {
                RunState::Waiting | RunState::Prepared => entry.set_state(RunState::Running),
                state => {
                    return Err(RunError::InvalidState {
                        run_id: run_id.to_string(),
                        action: "start",
                        state,
                    });
                }
            }
            (
                entry.submission.pipeline.clone(),
                entry.submission.config.clone(),
                entry.submission.arguments.clone(),
                entry.cancel.clone(),
                entry.status(run_id),
            )
        };

        let registry = Arc::clone(self);
        let run_id = run_id.to_string();
        tokio::spawn(async move {
            config.mode = RunMode::Local;
            let strategy = LocalStrategy::new(registry.engines.clone());
            info!(run_id = %run_id, pipeline = %pipeline.name, "Run started");
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                outcome = strategy.execute(&pipeline, None, &mut config, &arguments) => Some(outcome),
            };
            if let Some(outcome) = outcome {
                registry.finish(&run_id, outcome);
            }
        });

        Ok(status)
    }

    fn finish(&self, run_id: &str, outcome: Result<RunResult, crate::errors::ExecutionError>) {
        let Some(mut entry) = self.runs.get_mut(run_id) else {
            return;
        };
        if entry.state != RunState::Running {
            return;
        }
        match outcome {
            Ok(result) => {
                entry.result = Some(result);
                entry.set_state(if result.success {
                    RunState::Finished
                } else {
                    RunState::FinishedWithErrors
                });
            }
            Err(e) => {
                warn!(run_id = %run_id, "Run failed: {}", e);
                entry.result = Some(RunResult::failure(1));
                entry.error = Some(e.to_string());
                entry.set_state(RunState::FinishedWithErrors);
            }
        }
        info!(run_id = %run_id, state = %entry.state, "Run finished");
    }

    /// Stop a run that has not finished; finished runs are left as they are.
    pub fn stop(&self, run_id: &str) -> Result<RemoteStatus, RunError> {
        let mut entry = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
        if !entry.state.is_terminal() {
            entry.cancel.cancel();
            entry.set_state(RunState::Stopped);
            info!(run_id = %run_id, "Run stopped");
        }
        Ok(entry.status(run_id))
    }

    /// Stop the run if needed and forget it.
    pub fn cleanup(&self, run_id: &str) -> Result<PipelineDefinition, RunError> {
        self.stop(run_id)?;
        let (_, entry) = self
            .runs
            .remove(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
        info!(run_id = %run_id, "Run cleaned up");
        Ok(entry.submission.pipeline)
    }
}
