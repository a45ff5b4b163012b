//! Execution configuration passed into every strategy call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error returned when a textual mode or level cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid run mode '{0}'. Valid values: local, remote, clustered")]
    RunMode(String),

    #[error("Invalid log level '{0}'. Valid values: nothing, error, minimal, basic, detailed, debug, rowlevel")]
    LogLevel(String),
}

/// Where a pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Inside the calling process
    #[default]
    Local,
    /// On one designated remote worker
    Remote,
    /// Split across a fleet of workers
    Clustered,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Local => write!(f, "local"),
            RunMode::Remote => write!(f, "remote"),
            RunMode::Clustered => write!(f, "clustered"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(RunMode::Local),
            "remote" => Ok(RunMode::Remote),
            "clustered" | "cluster" => Ok(RunMode::Clustered),
            _ => Err(ParseError::RunMode(s.to_string())),
        }
    }
}

/// Verbosity of the pipeline's own logging, ordered from quietest to loudest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Nothing,
    Error,
    Minimal,
    #[default]
    Basic,
    Detailed,
    Debug,
    Rowlevel,
}

impl LogLevel {
    /// The matching `tracing` filter directive.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Nothing => "off",
            LogLevel::Error => "error",
            LogLevel::Minimal => "warn",
            LogLevel::Basic => "info",
            LogLevel::Detailed => "debug",
            LogLevel::Debug | LogLevel::Rowlevel => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Nothing => "nothing",
            LogLevel::Error => "error",
            LogLevel::Minimal => "minimal",
            LogLevel::Basic => "basic",
            LogLevel::Detailed => "detailed",
            LogLevel::Debug => "debug",
            LogLevel::Rowlevel => "rowlevel",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nothing" | "off" => Ok(LogLevel::Nothing),
            "error" => Ok(LogLevel::Error),
            "minimal" => Ok(LogLevel::Minimal),
            "basic" => Ok(LogLevel::Basic),
            "detailed" => Ok(LogLevel::Detailed),
            "debug" => Ok(LogLevel::Debug),
            "rowlevel" => Ok(LogLevel::Rowlevel),
            _ => Err(ParseError::LogLevel(s.to_string())),
        }
    }
}

/// A worker node reachable over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteServer {
    /// Logical name, used in logs and as the slave name in port keys
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Whether this node coordinates a cluster
    #[serde(default)]
    pub master: bool,
}

impl RemoteServer {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            username: None,
            password: None,
            master: false,
        }
    }

    /// Attach basic-auth credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Mark this server as a cluster master.
    pub fn as_master(mut self) -> Self {
        self.master = true;
        self
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for RemoteServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.host, self.port)
    }
}

/// Which stages of clustered dispatch are performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterOptions {
    /// Send sub-pipelines to their nodes
    pub post: bool,
    /// Ask nodes to prepare execution
    pub prepare: bool,
    /// Ask nodes to start execution
    pub start: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            post: true,
            prepare: true,
            start: true,
        }
    }
}

/// Settings for a single execution request.
///
/// Constructed by the caller and handed by mutable reference to one strategy
/// call. The strategy inserts internal and parameter variables before
/// dispatching; a configuration is never shared across concurrent calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfiguration {
    pub mode: RunMode,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub safe_mode: bool,
    #[serde(default)]
    pub gather_metrics: bool,
    /// Variables handed to the running pipeline; keys are unique
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Target worker for remote mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_server: Option<RemoteServer>,
    /// Engine used when running in-process
    #[serde(default = "default_run_configuration")]
    pub run_configuration: String,
    #[serde(default)]
    pub cluster: ClusterOptions,
}

fn default_run_configuration() -> String {
    "dry-run".to_string()
}

impl Default for ExecutionConfiguration {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            log_level: LogLevel::default(),
            safe_mode: false,
            gather_metrics: false,
            variables: BTreeMap::new(),
            remote_server: None,
            run_configuration: default_run_configuration(),
            cluster: ClusterOptions::default(),
        }
    }
}

impl ExecutionConfiguration {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_remote_server(mut self, server: RemoteServer) -> Self {
        self.remote_server = Some(server);
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_mode_parse() {
        assert_eq!("local".parse::<RunMode>().unwrap(), RunMode::Local);
        assert_eq!("REMOTE".parse::<RunMode>().unwrap(), RunMode::Remote);
        assert_eq!("cluster".parse::<RunMode>().unwrap(), RunMode::Clustered);
        assert!(matches!("swarm".parse::<RunMode>(), Err(ParseError::RunMode(_))));
    }

    #[test]
    fn test_log_level_ordering_and_filter() {
        assert!(LogLevel::Error < LogLevel::Basic);
        assert!(LogLevel::Rowlevel > LogLevel::Detailed);
        assert_eq!(LogLevel::Basic.as_filter(), "info");
        assert_eq!("Detailed".parse::<LogLevel>().unwrap(), LogLevel::Detailed);
    }

    #[test]
    fn test_remote_server_base_url() {
        let server = RemoteServer::new("slave-1", "10.0.0.4", 8181);
        assert_eq!(server.base_url(), "http://10.0.0.4:8181");
        assert_eq!(server.to_string(), "slave-1 (10.0.0.4:8181)");
    }

    #[test]
    fn test_configuration_deserializes_with_defaults() {
        let config: ExecutionConfiguration = serde_json::from_str(r#"{"mode":"remote"}"#).unwrap();
        assert_eq!(config.mode, RunMode::Remote);
        assert_eq!(config.log_level, LogLevel::Basic);
        assert_eq!(config.run_configuration, "dry-run");
        assert!(config.cluster.post && config.cluster.prepare && config.cluster.start);
        assert!(config.remote_server.is_none());
    }

    #[test]
    fn test_password_round_trips_but_is_omitted_when_absent() {
        let server = RemoteServer::new("w", "localhost", 1);
        let json = serde_json::to_string(&server).unwrap();
        assert!(!json.contains("password"));

        let server = server.with_credentials("admin", "secret");
        let json = serde_json::to_string(&server).unwrap();
        let back: RemoteServer = serde_json::from_str(&json).unwrap();
        assert_eq!(back.password.as_deref(), Some("secret"));
    }
}
