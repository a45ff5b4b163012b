//! Typed error hierarchy for the Ferry dispatcher.
//!
//! `ExecutionError` is what every strategy returns. Its variants follow the
//! stage that failed:
//! - `Configuration`: preconditions unmet, nothing was sent anywhere
//! - `Split`: the splitter could not produce a cluster plan
//! - `Dispatch`: sending, preparing or starting work on a node failed
//! - `Monitor`: waiting for a remote run failed or was cancelled
//! - `Cleanup`: compensation after an earlier failure failed as well; the
//!   earlier failure is kept as `cause`
//! - `Engine`: an in-process run failed; propagated unchanged

use thiserror::Error;

/// Unmet preconditions detected before any work is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("No remote server configured for remote execution")]
    NoRemoteServerConfigured,

    #[error("The pipeline needs a name to identify it on the remote server")]
    UnnamedPipeline,

    #[error("No engine registered for run configuration '{name}'")]
    UnknownRunConfiguration { name: String },

    #[error("Clustered execution requires a splitter")]
    NoSplitter,

    #[error("Cluster plan for '{pipeline}' has no nodes to run on")]
    EmptyCluster { pipeline: String },

    #[error("Unknown server '{name}'")]
    UnknownServer { name: String },
}

/// Failures while waiting for a remote run to finish.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("Monitoring run {run_id} on {server} failed: {message}")]
    Failed {
        server: String,
        run_id: String,
        message: String,
    },

    /// The wait was cancelled. The remote run's fate is unknown: it may still
    /// be running, finished, or failed.
    #[error("Monitoring run {run_id} on {server} was cancelled; remote state unknown")]
    Cancelled { server: String, run_id: String },
}

/// Errors from any execution strategy.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Unable to split pipeline '{pipeline}': {message}")]
    Split { pipeline: String, message: String },

    #[error("Dispatch to {server} failed: {message}")]
    Dispatch { server: String, message: String },

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("Cleanup failed ({cleanup}) after an earlier failure: {cause}")]
    Cleanup {
        cause: Box<ExecutionError>,
        cleanup: String,
    },

    #[error(transparent)]
    Engine(anyhow::Error),
}

impl ExecutionError {
    /// Build a dispatch error from any error chain, keeping every cause.
    pub fn dispatch(server: impl Into<String>, err: &anyhow::Error) -> Self {
        ExecutionError::Dispatch {
            server: server.into(),
            message: format!("{:#}", err),
        }
    }

    /// Wrap a cleanup failure around the failure that triggered cleanup.
    pub fn cleanup(cause: ExecutionError, cleanup: &ExecutionError) -> Self {
        ExecutionError::Cleanup {
            cause: Box::new(cause),
            cleanup: cleanup.to_string(),
        }
    }

    /// The failure that started it all, looking through cleanup wrappers.
    pub fn root_cause(&self) -> &ExecutionError {
        match self {
            ExecutionError::Cleanup { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Whether the error came from a cancelled wait.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.root_cause(),
            ExecutionError::Monitor(MonitorError::Cancelled { .. })
        )
    }
}

/// Errors from the port table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("No free port at or above {base_port} on host {host}")]
    Exhausted { host: String, base_port: u16 },

    #[error("Port table lock poisoned")]
    LockPoisoned,
}
