//! Serializable pipeline definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A declared pipeline parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    /// Value used when nothing was set explicitly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Explicitly set value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            value: None,
            description: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// A pipeline ("transformation") definition as it travels between processes.
///
/// Row-processing semantics live with the engine; this type only carries
/// what routing and supervision need: a name, the declared steps, the
/// parameters and the current variable values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(default)]
    pub name: String,
    /// File the definition was loaded from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Directory inside a repository, if loaded from one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_directory: Option<String>,
    /// Processing steps, in declaration order
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    /// Current variable values
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterDefinition) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Set a parameter's explicit value. Returns false if it is not declared.
    pub fn set_parameter_value(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(parameter) => {
                parameter.value = Some(value.into());
                true
            }
            None => false,
        }
    }
}

/// Reference to the persistence store a pipeline was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl RepositoryRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_parameter_value_only_for_declared() {
        let mut pipeline =
            PipelineDefinition::new("sales").with_parameter(ParameterDefinition::new("REGION").with_default("EU"));

        assert!(pipeline.set_parameter_value("REGION", "US"));
        assert!(!pipeline.set_parameter_value("MISSING", "x"));
        assert_eq!(pipeline.parameter("REGION").unwrap().value.as_deref(), Some("US"));
    }

    #[test]
    fn test_definition_deserializes_minimal_json() {
        let pipeline: PipelineDefinition = serde_json::from_str(r#"{"name":"load"}"#).unwrap();
        assert_eq!(pipeline.name, "load");
        assert!(pipeline.steps.is_empty());
        assert!(pipeline.parameters.is_empty());
    }
}
