use crate::errors::PortError;
use ferry_common::PortRequest;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::debug;

/// Identity of one step-to-step connection.
///
/// The per-run identifier of a [`PortRequest`] is deliberately absent so that
/// repeated runs of the same pipeline land on the same ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey {
    pub pipeline_name: String,
    pub source_slave: String,
    pub source_step: String,
    pub source_copy: u32,
    pub target_slave: String,
    pub target_step: String,
    pub target_copy: u32,
}

impl ConnectionKey {
    pub fn from_request(request: &PortRequest) -> Self {
        Self {
            pipeline_name: normalize_pipeline_name(&request.pipeline_name),
            source_slave: request.source_slave.clone(),
            source_step: request.source_step.clone(),
            source_copy: request.source_copy,
            target_slave: request.target_slave.clone(),
            target_step: request.target_step.clone(),
            target_copy: request.target_copy,
        }
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}/{}.{} -> {}/{}.{}",
            self.pipeline_name,
            self.source_slave,
            self.source_step,
            self.source_copy,
            self.target_slave,
            self.target_step,
            self.target_copy
        )
    }
}

/// One live binding in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub host: String,
    pub port: u16,
    pub key: ConnectionKey,
}

/// Strip whitespace and one trailing parenthesized sub-pipeline suffix, so
/// `"sales (slave-1)"` and `"sales"` share ports.
pub fn normalize_pipeline_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.ends_with(')') {
        if let Some(open) = trimmed.rfind(" (") {
            return trimmed[..open].trim_end().to_string();
        }
    }
    trimmed.to_string()
}

fn normalize_host(host: &str) -> String {
    host.trim().to_lowercase()
}

#[derive(Debug, Default)]
struct HostTable {
    by_key: HashMap<ConnectionKey, u16>,
    by_port: BTreeMap<u16, ConnectionKey>,
}

impl HostTable {
    /// Lowest port at or above `base` with no binding.
    fn lowest_free(&self, base: u16) -> Option<u16> {
        let mut candidate = u32::from(base);
        for &used in self.by_port.range(base..).map(|(port, _)| port) {
            if u32::from(used) != candidate {
                break;
            }
            candidate += 1;
        }
        u16::try_from(candidate).ok()
    }

    fn bind(&mut self, key: ConnectionKey, port: u16) {
        self.by_key.insert(key.clone(), port);
        self.by_port.insert(port, key);
    }

    fn unbind_port(&mut self, port: u16) -> Option<ConnectionKey> {
        let key = self.by_port.remove(&port)?;
        self.by_key.remove(&key);
        Some(key)
    }
}

/// Process-wide table of allocated ports, scoped per host.
///
/// Construct one per coordinating process and share it (`Arc`). All
/// scan-and-bind sequences run under a single lock, so two concurrent
/// requests for the same new connection always receive the same port.
#[derive(Debug, Default)]
pub struct PortAllocator {
    hosts: Mutex<HashMap<String, HostTable>>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the port bound to the request's connection, binding the lowest
    /// free port at or above `base_port` if there is none yet.
    pub fn allocate(&self, request: &PortRequest) -> Result<u16, PortError> {
        let host = normalize_host(&request.host);
        let key = ConnectionKey::from_request(request);

        let mut hosts = self.hosts.lock().map_err(|_| PortError::LockPoisoned)?;
        let table = hosts.entry(host.clone()).or_default();

        if let Some(&port) = table.by_key.get(&key) {
            debug!(host = %host, port, run_id = %request.run_id, connection = %key, "Reusing port");
            return Ok(port);
        }

        let port = table
            .lowest_free(request.base_port)
            .ok_or_else(|| PortError::Exhausted {
                host: host.clone(),
                base_port: request.base_port,
            })?;

        debug!(host = %host, port, run_id = %request.run_id, connection = %key, "Allocated port");
        table.bind(key, port);
        Ok(port)
    }

    /// Free a port on a host. Unknown pairs are ignored.
    ///
    /// Returns the connection that held the port, if any.
    pub fn deallocate(&self, host: &str, port: u16) -> Result<Option<ConnectionKey>, PortError> {
        let host = normalize_host(host);
        let mut hosts = self.hosts.lock().map_err(|_| PortError::LockPoisoned)?;

        let Some(table) = hosts.get_mut(&host) else {
            return Ok(None);
        };
        let freed = table.unbind_port(port);
        if table.by_port.is_empty() {
            hosts.remove(&host);
        }
        if let Some(key) = &freed {
            debug!(host = %host, port, connection = %key, "Deallocated port");
        }
        Ok(freed)
    }

    /// Free every port held by a pipeline on every host.
    ///
    /// Returns the number of bindings removed.
    pub fn release_pipeline(&self, pipeline_name: &str) -> Result<usize, PortError> {
        let name = normalize_pipeline_name(pipeline_name);
        let mut hosts = self.hosts.lock().map_err(|_| PortError::LockPoisoned)?;

        let mut released = 0;
        for table in hosts.values_mut() {
            let ports: Vec<u16> = table
                .by_port
                .iter()
                .filter(|(_, key)| key.pipeline_name == name)
                .map(|(port, _)| *port)
                .collect();
            for port in ports {
                table.unbind_port(port);
                released += 1;
            }
        }
        hosts.retain(|_, table| !table.by_port.is_empty());

        debug!(pipeline = %name, released, "Released pipeline ports");
        Ok(released)
    }

    /// Every live binding, ordered by host then port.
    pub fn snapshot(&self) -> Result<Vec<PortBinding>, PortError> {
        let hosts = self.hosts.lock().map_err(|_| PortError::LockPoisoned)?;
        let mut bindings: Vec<PortBinding> = hosts
            .iter()
            .flat_map(|(host, table)| {
                table.by_port.iter().map(move |(port, key)| PortBinding {
                    host: host.clone(),
                    port: *port,
                    key: key.clone(),
                })
            })
            .collect();
        bindings.sort_by(|a, b| a.host.cmp(&b.host).then(a.port.cmp(&b.port)));
        Ok(bindings)
    }
}
