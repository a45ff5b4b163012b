//! Shared domain types for the Ferry execution dispatcher.
//!
//! Everything in this crate crosses a process boundary at some point: the
//! dispatcher serializes it to a worker, or a worker reports it back. Types
//! here carry no behaviour beyond construction, parsing and aggregation.

pub mod config;
pub mod pipeline;
pub mod result;
pub mod variables;
pub mod wire;

pub use config::{ClusterOptions, ExecutionConfiguration, LogLevel, ParseError, RemoteServer, RunMode};
pub use pipeline::{ParameterDefinition, PipelineDefinition, RepositoryRef};
pub use result::RunResult;
pub use wire::{
    PortAllocated, PortDeallocation, PortRelease, PortRequest, PortsReleased, RemoteStatus, RunRegistered,
    RunState, RunSubmission, new_run_id,
};
