//! Deterministic TCP port allocation for cluster step connections.
//!
//! Clustered sub-pipelines stream rows to each other over direct TCP
//! connections. Every (source step copy → target step copy) pair needs a
//! port on the host that listens. The [`PortAllocator`] hands those out so
//! that the same logical connection gets the same port on every run, while
//! ports freed by finished runs are reused lowest-first.

pub mod allocator;

pub use allocator::{ConnectionKey, PortAllocator, PortBinding, normalize_pipeline_name};
