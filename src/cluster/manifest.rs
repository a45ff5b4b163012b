//! Pre-split cluster plans read from a TOML manifest.
//!
//! ```toml
//! [master]
//! server = "master"
//! steps = ["Merge", "Write"]
//!
//! [[slaves]]
//! server = "slave-1"
//! steps = ["Read", "Sort"]
//!
//! [[slaves]]
//! server = "slave-2"
//! pipeline = "sales-slave.toml"
//! ```
//!
//! A node either lists the steps it runs, in which case its sub-pipeline is
//! the original with those steps, or points at a pipeline file relative to
//! the manifest. Sub-pipelines are named `"<original> (<server>)"`.

use super::{ClusterPlan, NodeAssignment, Splitter};
use crate::errors::ConfigurationError;
use crate::pipeline::load_pipeline;
use anyhow::{Context, Result};
use ferry_common::{PipelineDefinition, RemoteServer};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
struct ManifestFile {
    master: NodeEntry,
    #[serde(default)]
    slaves: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct NodeEntry {
    server: String,
    #[serde(default)]
    steps: Vec<String>,
    #[serde(default)]
    pipeline: Option<PathBuf>,
}

#[derive(Debug, Clone)]
enum SubPipeline {
    Steps(Vec<String>),
    File(PipelineDefinition),
}

#[derive(Debug, Clone)]
struct StaticNode {
    server: RemoteServer,
    sub: SubPipeline,
}

impl StaticNode {
    fn resolve(entry: NodeEntry, servers: &[RemoteServer], base_dir: &Path) -> Result<Self> {
        let server = servers
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(&entry.server))
            .cloned()
            .ok_or(ConfigurationError::UnknownServer {
                name: entry.server.clone(),
            })?;
        let sub = match entry.pipeline {
            Some(path) => {
                let path = base_dir.join(path);
                SubPipeline::File(load_pipeline(&path)?)
            }
            None => SubPipeline::Steps(entry.steps),
        };
        Ok(Self { server, sub })
    }

    fn assign(&self, original: &PipelineDefinition) -> NodeAssignment {
        let mut pipeline = match &self.sub {
            SubPipeline::Steps(steps) => {
                let mut sub = original.clone();
                sub.steps = steps.clone();
                sub
            }
            SubPipeline::File(definition) => definition.clone(),
        };
        pipeline.name = format!("{} ({})", original.name, self.server.name);
        NodeAssignment::new(self.server.clone(), pipeline)
    }
}

/// A [`Splitter`] that hands out the same pre-split plan for any pipeline.
#[derive(Debug, Clone)]
pub struct StaticSplitter {
    master: StaticNode,
    slaves: Vec<StaticNode>,
}

impl StaticSplitter {
    /// Load a manifest, resolving server names against `servers`.
    pub fn load(path: &Path, servers: &[RemoteServer]) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cluster manifest: {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, servers, base_dir)
            .with_context(|| format!("Invalid cluster manifest: {}", path.display()))
    }

    /// Parse manifest text; pipeline paths resolve against `base_dir`.
    pub fn parse(content: &str, servers: &[RemoteServer], base_dir: &Path) -> Result<Self> {
        let file: ManifestFile = toml::from_str(content).context("Failed to parse cluster manifest")?;
        let mut master = StaticNode::resolve(file.master, servers, base_dir)?;
        master.server.master = true;
        let slaves = file
            .slaves
            .into_iter()
            .map(|entry| StaticNode::resolve(entry, servers, base_dir))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { master, slaves })
    }
}

impl Splitter for StaticSplitter {
    fn split(&self, pipeline: &PipelineDefinition) -> Result<ClusterPlan> {
        Ok(ClusterPlan::new(
            pipeline.clone(),
            self.master.assign(pipeline),
            self.slaves.iter().map(|s| s.assign(pipeline)).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_common::ParameterDefinition;
    use std::fs;
    use tempfile::TempDir;

    fn servers() -> Vec<RemoteServer> {
        vec![
            RemoteServer::new("master", "10.0.0.1", 8181),
            RemoteServer::new("slave-1", "10.0.0.2", 8181),
            RemoteServer::new("slave-2", "10.0.0.3", 8181),
        ]
    }

    const MANIFEST: &str = r#"
[master]
server = "master"
steps = ["Merge", "Write"]

[[slaves]]
server = "Slave-1"
steps = ["Read", "Sort"]

[[slaves]]
server = "slave-2"
steps = ["Read", "Sort"]
"#;

    #[test]
    fn test_split_from_inline_steps() {
        let splitter = StaticSplitter::parse(MANIFEST, &servers(), Path::new(".")).unwrap();
        let original = PipelineDefinition::new("sales")
            .with_steps(["Read", "Sort", "Merge", "Write"])
            .with_parameter(ParameterDefinition::new("REGION"));

        let plan = splitter.split(&original).unwrap();
        assert_eq!(plan.original_pipeline(), &original);
        assert!(plan.master.server.master);
        assert_eq!(plan.master.pipeline.name, "sales (master)");
        assert_eq!(plan.master.pipeline.steps, vec!["Merge", "Write"]);
        assert_eq!(plan.cluster_size(), 2);
        assert_eq!(plan.slaves[0].server.host, "10.0.0.2");
        assert_eq!(plan.slaves[0].pipeline.parameters.len(), 1);
    }

    #[test]
    fn test_unknown_server_is_rejected() {
        let manifest = "[master]\nserver = \"nowhere\"\n";
        let err = StaticSplitter::parse(manifest, &servers(), Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("Unknown server 'nowhere'"));
    }

    #[test]
    fn test_load_with_pipeline_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("slave.toml"), "steps = [\"Read\"]\n").unwrap();
        let manifest = dir.path().join("cluster.toml");
        fs::write(
            &manifest,
            "[master]\nserver = \"master\"\n\n[[slaves]]\nserver = \"slave-1\"\npipeline = \"slave.toml\"\n",
        )
        .unwrap();

        let splitter = StaticSplitter::load(&manifest, &servers()).unwrap();
        let plan = splitter.split(&PipelineDefinition::new("orders")).unwrap();
        assert!(!plan.master.has_work());
        assert_eq!(plan.slaves[0].pipeline.steps, vec!["Read"]);
        assert_eq!(plan.slaves[0].pipeline.name, "orders (slave-1)");
    }

    #[test]
    fn test_missing_manifest_reports_path() {
        let err = StaticSplitter::load(Path::new("/nonexistent/cluster.toml"), &servers()).unwrap_err();
        assert!(err.to_string().contains("Failed to read cluster manifest"));
    }
}
