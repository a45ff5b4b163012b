//! Clustered execution: one logical pipeline split across a master and a
//! set of slave workers.
//!
//! The pieces:
//! - [`Splitter`] turns a pipeline into a [`ClusterPlan`] (master and slave
//!   sub-pipelines plus the original)
//! - [`ClusterExecutor`] posts, prepares, starts, watches, stops and cleans
//!   up the plan's nodes; [`RemoteClusterExecutor`] does so over a
//!   [`RemoteTransport`](crate::remote::RemoteTransport)
//! - [`ClusterCoordinator`] drives one clustered run through its states and
//!   compensates on failure
//! - [`manifest::StaticSplitter`] reads pre-split plans from a TOML manifest

pub mod coordinator;
pub mod executor;
pub mod manifest;

use anyhow::Result;
use ferry_common::{PipelineDefinition, RemoteServer, new_run_id};

pub use coordinator::{ClusterCoordinator, CoordinatorState};
pub use executor::{ClusterExecutor, RemoteClusterExecutor};
pub use manifest::StaticSplitter;

/// Produces the per-node sub-pipelines for a clustered run.
pub trait Splitter: Send + Sync {
    fn split(&self, pipeline: &PipelineDefinition) -> Result<ClusterPlan>;
}

/// One sub-pipeline bound to the server that runs it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAssignment {
    pub server: RemoteServer,
    pub pipeline: PipelineDefinition,
}

impl NodeAssignment {
    pub fn new(server: RemoteServer, pipeline: PipelineDefinition) -> Self {
        Self { server, pipeline }
    }

    /// Whether the sub-pipeline has any steps to run.
    pub fn has_work(&self) -> bool {
        !self.pipeline.steps.is_empty()
    }
}

/// Result of splitting a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPlan {
    pub master: NodeAssignment,
    pub slaves: Vec<NodeAssignment>,
    original: PipelineDefinition,
}

impl ClusterPlan {
    pub fn new(original: PipelineDefinition, master: NodeAssignment, slaves: Vec<NodeAssignment>) -> Self {
        Self {
            master,
            slaves,
            original,
        }
    }

    /// The unsplit pipeline; parameters are resolved against it.
    pub fn original_pipeline(&self) -> &PipelineDefinition {
        &self.original
    }

    /// Number of slaves, as published in `Internal.Cluster.Size`.
    pub fn cluster_size(&self) -> usize {
        self.slaves.len()
    }

    /// True when no node has anything to run.
    pub fn is_empty(&self) -> bool {
        !self.master.has_work() && self.slaves.is_empty()
    }
}

/// A sub-pipeline that was registered on a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedNode {
    pub server: RemoteServer,
    pub run_id: String,
    pub pipeline_name: String,
    pub master: bool,
}

/// Bookkeeping for one clustered run.
///
/// The executor appends each node as soon as the worker accepts it, so that a
/// partly dispatched cluster can still be cleaned up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRun {
    /// Published as `Internal.Cluster.Run.ID`
    pub id: String,
    pub nodes: Vec<DispatchedNode>,
}

impl ClusterRun {
    pub fn new() -> Self {
        Self {
            id: new_run_id(),
            nodes: Vec::new(),
        }
    }

    pub fn master(&self) -> Option<&DispatchedNode> {
        self.nodes.iter().find(|n| n.master)
    }

    pub fn slaves(&self) -> impl Iterator<Item = &DispatchedNode> {
        self.nodes.iter().filter(|n| !n.master)
    }
}

impl Default for ClusterRun {
    fn default() -> Self {
        Self::new()
    }
}
