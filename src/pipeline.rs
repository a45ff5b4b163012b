//! Pipeline handles and definition loading.
//!
//! The dispatcher only needs a narrow view of a pipeline: its name, its
//! declared parameters and the current values of its variables. That view is
//! [`PipelineHandle`]; [`PipelineDefinition`] is the concrete, serializable
//! implementation loaded from `.toml` or `.json` files.

use anyhow::{Context, Result};
use ferry_common::PipelineDefinition;
use ferry_common::variables::{
    INTERNAL_ENTRY_CURRENT_DIRECTORY, INTERNAL_PIPELINE_FILENAME_DIRECTORY,
    INTERNAL_PIPELINE_FILENAME_NAME, INTERNAL_PIPELINE_NAME, INTERNAL_PIPELINE_REPOSITORY_DIRECTORY,
    INTERNAL_PIPELINE_VARIABLES,
};
use std::path::Path;

/// Read-only view of a pipeline used for variable and parameter injection.
pub trait PipelineHandle: Send + Sync {
    /// Stable name identifying the pipeline on remote workers.
    fn name(&self) -> &str;

    /// Names of the declared parameters, in declaration order.
    fn parameter_names(&self) -> Vec<String>;

    /// Explicitly set value of a parameter.
    fn parameter_value(&self, name: &str) -> Option<String>;

    /// Declared default of a parameter.
    fn parameter_default(&self, name: &str) -> Option<String>;

    /// Current value of a variable.
    fn variable(&self, name: &str) -> Option<String>;

    /// Internal variables whose current values travel with a remote run.
    fn internal_variable_names(&self) -> Vec<String> {
        INTERNAL_PIPELINE_VARIABLES.iter().map(|s| s.to_string()).collect()
    }
}

impl PipelineHandle for PipelineDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    fn parameter_value(&self, name: &str) -> Option<String> {
        self.parameter(name).and_then(|p| p.value.clone())
    }

    fn parameter_default(&self, name: &str) -> Option<String> {
        self.parameter(name).and_then(|p| p.default.clone())
    }

    fn variable(&self, name: &str) -> Option<String> {
        if let Some(value) = self.variables.get(name) {
            return Some(value.clone());
        }
        // Internal variables derived from the definition itself
        let path = self.filename.as_deref().map(Path::new);
        match name {
            INTERNAL_PIPELINE_NAME => Some(self.name.clone()),
            INTERNAL_PIPELINE_FILENAME_NAME => path
                .and_then(|p| p.file_name())
                .map(|f| f.to_string_lossy().into_owned()),
            INTERNAL_PIPELINE_FILENAME_DIRECTORY | INTERNAL_ENTRY_CURRENT_DIRECTORY => path
                .and_then(|p| p.parent())
                .map(|d| d.to_string_lossy().into_owned()),
            INTERNAL_PIPELINE_REPOSITORY_DIRECTORY => self.repository_directory.clone(),
            _ => None,
        }
    }
}

/// Load a pipeline definition from a `.toml` or `.json` file.
///
/// The definition's `filename` is set to the path it was loaded from, and a
/// missing name defaults to the file stem.
pub fn load_pipeline(path: &Path) -> Result<PipelineDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

    let mut pipeline: PipelineDefinition = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline JSON: {}", path.display()))?,
        _ => toml::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline TOML: {}", path.display()))?,
    };

    if pipeline.name.trim().is_empty() {
        if let Some(stem) = path.file_stem() {
            pipeline.name = stem.to_string_lossy().into_owned();
        }
    }
    let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    pipeline.filename = Some(absolute.to_string_lossy().into_owned());

    Ok(pipeline)
}

/// Parse `KEY=VALUE` pairs as given on the command line.
pub fn parse_assignment(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Empty key in assignment '{}'", raw);
    }
    Ok((key.to_string(), value.to_string()))
}
