//! Configuration for Ferry.
//!
//! Reads `.ferry/ferry.toml` from the project directory and layers
//! configuration file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [defaults]
//! log_level = "basic"
//! safe_mode = false
//! gather_metrics = false
//! run_configuration = "dry-run"
//!
//! [ports]
//! base_port = 40000
//!
//! [monitor]
//! poll_interval_ms = 1000
//!
//! [worker]
//! bind = "127.0.0.1"
//! port = 8181
//!
//! [[servers]]
//! name = "master"
//! host = "10.0.0.1"
//! port = 8181
//! master = true
//!
//! [[servers]]
//! name = "slave-1"
//! host = "10.0.0.2"
//! port = 8181
//! username = "cluster"
//! password = "cluster"
//! ```
//!
//! Environment overrides: `FERRY_LOG_LEVEL`, `FERRY_BASE_PORT`,
//! `FERRY_POLL_INTERVAL_MS`, `FERRY_RUN_CONFIGURATION`.

use crate::errors::ConfigurationError;
use crate::worker::ServerConfig;
use anyhow::{Context, Result};
use ferry_common::{ExecutionConfiguration, LogLevel, RemoteServer, RunMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings every execution starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub safe_mode: bool,
    #[serde(default)]
    pub gather_metrics: bool,
    /// Engine used for local runs
    #[serde(default = "default_run_configuration")]
    pub run_configuration: String,
}

fn default_run_configuration() -> String {
    crate::engine::dry_run::NAME.to_string()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            safe_mode: false,
            gather_metrics: false,
            run_configuration: default_run_configuration(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortsConfig {
    /// First port handed out on each host
    #[serde(default = "default_base_port")]
    pub base_port: u16,
}

fn default_base_port() -> u16 {
    40000
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            base_port: default_base_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between status polls of a remote run
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_worker_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_worker_port() -> u16 {
    8181
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_worker_port(),
        }
    }
}

/// The complete ferry.toml structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FerryToml {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub ports: PortsConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Known worker nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<RemoteServer>,
}

impl FerryToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse ferry.toml")
    }

    /// Load `ferry.toml` from `ferry_dir`, or defaults when it doesn't exist.
    pub fn load_or_default(ferry_dir: &Path) -> Result<Self> {
        let config_path = ferry_dir.join("ferry.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize ferry.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("FERRY_LOG_LEVEL") {
            self.defaults.log_level = level.parse().context("Invalid FERRY_LOG_LEVEL")?;
        }
        if let Some(port) = lookup("FERRY_BASE_PORT") {
            self.ports.base_port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid FERRY_BASE_PORT '{}'", port))?;
        }
        if let Some(interval) = lookup("FERRY_POLL_INTERVAL_MS") {
            self.monitor.poll_interval_ms = interval
                .trim()
                .parse()
                .with_context(|| format!("Invalid FERRY_POLL_INTERVAL_MS '{}'", interval))?;
        }
        if let Some(engine) = lookup("FERRY_RUN_CONFIGURATION") {
            self.defaults.run_configuration = engine;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.monitor.poll_interval_ms == 0 {
            warnings.push("monitor.poll_interval_ms is 0; remote runs will be polled continuously".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.name.to_lowercase()) {
                warnings.push(format!("Server '{}' is defined more than once", server.name));
            }
        }

        if self.servers.iter().filter(|s| s.master).count() > 1 {
            warnings.push("More than one server is marked as master".to_string());
        }

        warnings
    }
}

/// Effective configuration for one invocation: file, then environment,
/// then CLI overrides applied by the command.
#[derive(Debug, Clone)]
pub struct FerryConfig {
    pub project_dir: PathBuf,
    pub ferry_dir: PathBuf,
    pub toml: FerryToml,
}

impl FerryConfig {
    /// Load from a project directory and apply environment overrides.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let ferry_dir = project_dir.join(".ferry");
        let mut toml = FerryToml::load_or_default(&ferry_dir)?;
        toml.apply_env()?;

        Ok(Self {
            project_dir,
            ferry_dir,
            toml,
        })
    }

    /// Path to `ferry.toml`.
    pub fn config_file(&self) -> PathBuf {
        self.ferry_dir.join("ferry.toml")
    }

    /// Default cluster manifest location.
    pub fn cluster_manifest(&self) -> PathBuf {
        self.ferry_dir.join("cluster.toml")
    }

    /// An execution configuration seeded from `[defaults]`.
    pub fn execution_configuration(&self, mode: RunMode) -> ExecutionConfiguration {
        let defaults = &self.toml.defaults;
        let mut config = ExecutionConfiguration::new(mode).with_log_level(defaults.log_level);
        config.safe_mode = defaults.safe_mode;
        config.gather_metrics = defaults.gather_metrics;
        config.run_configuration = defaults.run_configuration.clone();
        config
    }

    /// Look up a configured server by name, ignoring case.
    pub fn server(&self, name: &str) -> Result<&RemoteServer, ConfigurationError> {
        self.toml
            .servers
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigurationError::UnknownServer {
                name: name.to_string(),
            })
    }

    pub fn servers(&self) -> &[RemoteServer] {
        &self.toml.servers
    }

    pub fn base_port(&self) -> u16 {
        self.toml.ports.base_port
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.toml.monitor.poll_interval_ms)
    }

    /// Worker listen settings, with optional CLI overrides.
    pub fn server_config(&self, bind: Option<String>, port: Option<u16>) -> ServerConfig {
        ServerConfig {
            bind: bind.unwrap_or_else(|| self.toml.worker.bind.clone()),
            port: port.unwrap_or(self.toml.worker.port),
            ..ServerConfig::default()
        }
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
