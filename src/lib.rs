pub mod cluster;
pub mod engine;
pub mod errors;
pub mod ferry_config;
pub mod injection;
pub mod logging;
pub mod pipeline;
pub mod ports;
pub mod remote;
pub mod strategy;
pub mod worker;

pub use errors::{ConfigurationError, ExecutionError, MonitorError, PortError};
pub use strategy::{Dispatcher, ExecutionStrategy};
