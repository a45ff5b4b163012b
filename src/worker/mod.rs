//! Worker node: the HTTP surface other nodes and the dispatcher talk to.
//!
//! A worker accepts run submissions, executes them in-process through the
//! local strategy, reports their status, and owns the port table that
//! clustered sub-pipelines allocate their connections from.

pub mod api;
pub mod runs;
pub mod server;

pub use api::{SharedState, WorkerState};
pub use runs::{RunError, RunRegistry};
pub use server::{ServerConfig, build_router, serve, start_server, worker_state};
